//! Per-task request/response bookkeeping.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::ProtocolError;
use crate::protocol::{Request, Response};

/// Identifies one submitted request within a channel.
pub(crate) type Ticket = u64;

/// The request/response queue of a single task.
///
/// Requests submitted while the task is being polled collect in the outbox and
/// are emitted as one batch when the poll suspends. The next batch of responses
/// is matched to that batch by position.
#[derive(Debug, Default)]
pub(crate) struct Channel {
  next_ticket: Cell<Ticket>,
  outbox: RefCell<Vec<(Ticket, Request)>>,
  in_flight: RefCell<VecDeque<Ticket>>,
  ready: RefCell<HashMap<Ticket, Response>>,
}

impl Channel {
  pub(crate) fn submit(&self, request: Request) -> Ticket {
    let ticket = self.next_ticket.get();
    self.next_ticket.set(ticket + 1);
    self.outbox.borrow_mut().push((ticket, request));
    ticket
  }

  /// Collect the response for `ticket`, if it has arrived.
  pub(crate) fn take(&self, ticket: Ticket) -> Option<Response> {
    self.ready.borrow_mut().remove(&ticket)
  }

  /// Move the outbox in flight and return its requests in submission order.
  pub(crate) fn flush(&self) -> Vec<Request> {
    let outbox = std::mem::take(&mut *self.outbox.borrow_mut());
    let mut in_flight = self.in_flight.borrow_mut();
    outbox
      .into_iter()
      .map(|(ticket, request)| {
        in_flight.push_back(ticket);
        request
      })
      .collect()
  }

  /// Match a response batch against the requests currently in flight.
  pub(crate) fn deliver(&self, responses: Vec<Response>) -> Result<(), ProtocolError> {
    let mut in_flight = self.in_flight.borrow_mut();
    if responses.len() != in_flight.len() {
      return Err(ProtocolError::ResponseCount {
        expected: in_flight.len(),
        actual: responses.len(),
      });
    }
    let mut ready = self.ready.borrow_mut();
    for (ticket, response) in in_flight.drain(..).zip(responses) {
      ready.insert(ticket, response);
    }
    Ok(())
  }
}

thread_local! {
  static CURRENT: RefCell<Vec<Rc<Channel>>> = const { RefCell::new(Vec::new()) };
}

/// The channel of the innermost task being polled on this thread.
pub(crate) fn current() -> Option<Rc<Channel>> {
  CURRENT.with(|stack| stack.borrow().last().cloned())
}

/// Marks a channel as current until dropped.
pub(crate) struct Enter(());

impl Enter {
  pub(crate) fn new(channel: Rc<Channel>) -> Self {
    CURRENT.with(|stack| stack.borrow_mut().push(channel));
    Enter(())
  }
}

impl Drop for Enter {
  fn drop(&mut self) {
    CURRENT.with(|stack| {
      stack.borrow_mut().pop();
    });
  }
}
