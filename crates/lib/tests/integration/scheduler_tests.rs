use futures::FutureExt;
use futures::future::LocalBoxFuture;
use trellis_lib::error::ProtocolError;
use trellis_lib::protocol::{Request, Response};
use trellis_lib::task::{Step, Task, group, request};

use super::common::label;

/// Count `trips` sequential existence probes of `name` answered positively.
async fn probe_many(name: &'static str, trips: usize) -> Result<usize, ProtocolError> {
  let mut found = 0;
  for _ in 0..trips {
    let response = request(Request::FileExists { label: label(name) }).await?;
    if response == (Response::Boolean { value: true }) {
      found += 1;
    }
  }
  Ok(found)
}

fn members() -> Vec<LocalBoxFuture<'static, Result<usize, ProtocolError>>> {
  vec![
    probe_many("//one", 1).boxed_local(),
    probe_many("//three", 3).boxed_local(),
    probe_many("//none", 0).boxed_local(),
  ]
}

/// Run `task` against a host that answers yes to everything, counting trips.
fn run_counting<T>(mut task: Task<'_, T>) -> (T, usize) {
  let mut trips = 0;
  let mut responses = Vec::new();
  loop {
    match task.resume(responses).unwrap() {
      Step::Done(output) => return (output, trips),
      Step::Pending(requests) => {
        trips += 1;
        responses = requests.iter().map(|_| Response::Boolean { value: true }).collect();
      }
    }
  }
}

#[test]
fn group_matches_sequential_execution_with_fewer_trips() {
  let mut sequential_results = Vec::new();
  let mut sequential_trips = 0;
  for member in members() {
    let (result, trips) = run_counting(Task::new(member));
    sequential_results.push(result);
    sequential_trips += trips;
  }

  let (grouped, grouped_trips) = run_counting(Task::new(group(members())));
  assert_eq!(grouped.unwrap(), sequential_results);
  assert_eq!(sequential_results, vec![Ok(1), Ok(3), Ok(0)]);
  assert!(grouped_trips <= sequential_trips);
  assert_eq!(grouped_trips, 3);
}

#[test]
fn empty_group_completes_immediately() {
  let futures: Vec<LocalBoxFuture<'static, usize>> = Vec::new();
  let (result, trips) = run_counting(Task::new(group(futures)));
  assert_eq!(result.unwrap(), Vec::<usize>::new());
  assert_eq!(trips, 0);
}

#[test]
fn responses_route_back_by_position() {
  let mut task = Task::new(group(vec![
    probe_many("//a", 2).boxed_local(),
    probe_many("//b", 1).boxed_local(),
  ]));
  let Step::Pending(first) = task.resume(vec![]).unwrap() else {
    panic!("expected a request batch");
  };
  assert_eq!(first.len(), 2);

  // //a is told no, //b yes.
  let Step::Pending(second) = task
    .resume(vec![Response::Boolean { value: false }, Response::Boolean { value: true }])
    .unwrap()
  else {
    panic!("expected a second batch");
  };
  assert_eq!(second, vec![Request::FileExists { label: label("//a") }]);

  match task.resume(vec![Response::Boolean { value: true }]).unwrap() {
    Step::Done(results) => assert_eq!(results.unwrap(), vec![Ok(1), Ok(1)]),
    Step::Pending(requests) => panic!("unexpected requests {:?}", requests),
  }
}
