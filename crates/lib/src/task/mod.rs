//! Cooperative, single-threaded scheduling of analysis logic.
//!
//! Analysis code is written as ordinary `async` Rust. Its only suspension
//! points are host calls ([`request`]) and groups of sub-tasks ([`Group`]).
//! A [`Task`] drives such a future by hand: each [`Task::resume`] delivers the
//! responses to the previous batch of requests and polls until the future
//! either finishes or suspends with a new batch.
//!
//! Nothing here spawns threads or uses a real waker. Every task owns a
//! [`Channel`](channel::Channel) that is made current while the task is polled,
//! which is how a host call finds the task it belongs to.

mod channel;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::protocol::{Request, Response};
use channel::{Channel, Enter, Ticket};

/// Outcome of resuming a task once.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
  /// The task suspended; answer these requests, in order, in the next resume.
  Pending(Vec<Request>),
  Done(T),
}

/// A suspendable computation driven one host round trip at a time.
pub struct Task<'a, T> {
  future: Option<LocalBoxFuture<'a, T>>,
  channel: Rc<Channel>,
}

impl<'a, T> Task<'a, T> {
  pub fn new<F>(future: F) -> Self
  where
    F: Future<Output = T> + 'a,
  {
    Task {
      future: Some(future.boxed_local()),
      channel: Rc::new(Channel::default()),
    }
  }

  pub fn is_finished(&self) -> bool {
    self.future.is_none()
  }

  /// Deliver `responses` for the last request batch and run until the next
  /// suspension.
  ///
  /// The first resume of a task must pass no responses.
  pub fn resume(&mut self, responses: Vec<Response>) -> Result<Step<T>, ProtocolError> {
    let future = self.future.as_mut().ok_or(ProtocolError::Finished)?;
    self.channel.deliver(responses)?;

    let poll = {
      let _enter = Enter::new(self.channel.clone());
      let mut cx = Context::from_waker(noop_waker_ref());
      future.as_mut().poll(&mut cx)
    };

    match poll {
      Poll::Ready(output) => {
        self.future = None;
        Ok(Step::Done(output))
      }
      Poll::Pending => {
        let requests = self.channel.flush();
        if requests.is_empty() {
          return Err(ProtocolError::Stalled);
        }
        trace!(count = requests.len(), "task suspended");
        Ok(Step::Pending(requests))
      }
    }
  }
}

/// Issue one request to the host and wait for its response.
pub fn request(request: Request) -> HostCall {
  HostCall {
    request: Some(request),
    ticket: None,
  }
}

/// A single outstanding host request.
///
/// Submits its request to the current task on first poll and completes with
/// the matching response once the task has been resumed with it.
#[derive(Debug)]
pub struct HostCall {
  request: Option<Request>,
  ticket: Option<Ticket>,
}

impl Future for HostCall {
  type Output = Result<Response, ProtocolError>;

  fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let Some(channel) = channel::current() else {
      return Poll::Ready(Err(ProtocolError::OutsideTask));
    };
    match this.ticket {
      None => match this.request.take() {
        Some(request) => {
          this.ticket = Some(channel.submit(request));
          Poll::Pending
        }
        None => Poll::Ready(Err(ProtocolError::Finished)),
      },
      Some(ticket) => match channel.take(ticket) {
        Some(response) => Poll::Ready(Ok(response)),
        None => Poll::Pending,
      },
    }
  }
}

/// Drive many sub-tasks over the enclosing task's request channel.
///
/// Every sub-task is primed once; the requests of all still-running sub-tasks
/// are concatenated in submission order into the enclosing task's batch, and
/// each response is routed back to the sub-task that issued the request. A
/// sub-task is resumed once it has every response it is owed. Results come
/// back in the order the sub-tasks were given. There is no cancellation: once
/// polled, every member runs to completion.
pub struct Group<'a, T> {
  tasks: Vec<Task<'a, T>>,
  outputs: Vec<Option<T>>,
  /// Outstanding requests in emission order, with the sub-task each belongs to.
  associations: std::collections::VecDeque<(Ticket, usize)>,
  /// Responses collected per sub-task but not yet delivered.
  buffered: Vec<Vec<Response>>,
  owed: Vec<usize>,
  started: bool,
}

impl<'a, T> Group<'a, T> {
  pub fn new<I, F>(futures: I) -> Self
  where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + 'a,
  {
    let tasks: Vec<Task<'a, T>> = futures.into_iter().map(Task::new).collect();
    let count = tasks.len();
    Group {
      tasks,
      outputs: (0..count).map(|_| None).collect(),
      associations: Default::default(),
      buffered: vec![Vec::new(); count],
      owed: vec![0; count],
      started: false,
    }
  }

  fn step(&mut self, index: usize, responses: Vec<Response>, channel: &Channel) -> Result<(), ProtocolError> {
    match self.tasks[index].resume(responses)? {
      Step::Done(output) => self.outputs[index] = Some(output),
      Step::Pending(requests) => {
        for request in requests {
          let ticket = channel.submit(request);
          self.associations.push_back((ticket, index));
          self.owed[index] += 1;
        }
      }
    }
    Ok(())
  }

  fn poll_group(&mut self, channel: &Channel) -> Result<Option<Vec<T>>, ProtocolError> {
    if !self.started {
      self.started = true;
      debug!(members = self.tasks.len(), "starting task group");
      for index in 0..self.tasks.len() {
        self.step(index, Vec::new(), channel)?;
      }
    } else {
      while let Some(&(ticket, index)) = self.associations.front() {
        let Some(response) = channel.take(ticket) else {
          break;
        };
        self.associations.pop_front();
        self.buffered[index].push(response);
        self.owed[index] -= 1;
        if self.owed[index] == 0 {
          let responses = std::mem::take(&mut self.buffered[index]);
          self.step(index, responses, channel)?;
        }
      }
    }

    if self.outputs.iter().all(Option::is_some) {
      Ok(Some(self.outputs.iter_mut().filter_map(Option::take).collect()))
    } else {
      Ok(None)
    }
  }
}

// Sub-task futures are boxed; nothing in a group is structurally pinned.
impl<T> Unpin for Group<'_, T> {}

impl<T> Future for Group<'_, T> {
  type Output = Result<Vec<T>, ProtocolError>;

  fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let Some(channel) = channel::current() else {
      return Poll::Ready(Err(ProtocolError::OutsideTask));
    };
    match this.poll_group(&channel) {
      Ok(Some(outputs)) => Poll::Ready(Ok(outputs)),
      Ok(None) => Poll::Pending,
      Err(err) => Poll::Ready(Err(err)),
    }
  }
}

/// Run `futures` as one [`Group`].
pub fn group<'a, I, F>(futures: I) -> Group<'a, F::Output>
where
  I: IntoIterator<Item = F>,
  F: Future + 'a,
{
  Group::new(futures)
}
