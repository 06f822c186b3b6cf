//! Collective communication contract.
//!
//! The adaptation core is SPMD: every rank runs the same pass sequence
//! and meets the others only at these collective calls. The driver and
//! ghost protocol are written against the [`Collective`] trait so the
//! same code runs single-rank, under an MPI binding, or (for the test
//! suite) on in-process ranks wired together with channels.
//!
//! All ranks must issue the same collectives in the same order; the
//! calls are the only suspension points in the core.

use std::cell::RefCell;
use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Scalar reductions, broadcast, and all-to-all exchange.
pub trait Collective {
  fn rank(&self) -> usize;
  fn size(&self) -> usize;

  fn all_min_f64(&self, v: f64) -> f64;
  fn all_max_f64(&self, v: f64) -> f64;
  fn all_sum_f64(&self, v: f64) -> f64;
  fn all_max_i64(&self, v: i64) -> i64;
  fn all_sum_i64(&self, v: i64) -> i64;

  /// Everyone receives `root`'s value.
  fn bcast_bool(&self, v: bool, root: usize) -> bool;

  /// Everyone receives every rank's scalar, indexed by rank.
  fn all_gather_i64(&self, v: i64) -> Vec<i64>;

  /// Fixed-size exchange: element `r` of `send` goes to rank `r`;
  /// element `r` of the result came from rank `r`.
  fn all_to_all_i64(&self, send: &[i64]) -> Vec<i64>;

  /// Variable-length exchange of integer payloads.
  fn all_to_all_v_i64(&self, send: Vec<Vec<i64>>) -> Vec<Vec<i64>>;

  /// Variable-length exchange of floating payloads.
  fn all_to_all_v_f64(&self, send: Vec<Vec<f64>>) -> Vec<Vec<f64>>;
}

// =============================================================================
// SingleRank - the degenerate communicator
// =============================================================================

/// One-rank world; every collective is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleRank;

impl Collective for SingleRank {
  fn rank(&self) -> usize {
    0
  }
  fn size(&self) -> usize {
    1
  }
  fn all_min_f64(&self, v: f64) -> f64 {
    v
  }
  fn all_max_f64(&self, v: f64) -> f64 {
    v
  }
  fn all_sum_f64(&self, v: f64) -> f64 {
    v
  }
  fn all_max_i64(&self, v: i64) -> i64 {
    v
  }
  fn all_sum_i64(&self, v: i64) -> i64 {
    v
  }
  fn bcast_bool(&self, v: bool, _root: usize) -> bool {
    v
  }
  fn all_gather_i64(&self, v: i64) -> Vec<i64> {
    vec![v]
  }
  fn all_to_all_i64(&self, send: &[i64]) -> Vec<i64> {
    send.to_vec()
  }
  fn all_to_all_v_i64(&self, send: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    send
  }
  fn all_to_all_v_f64(&self, send: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    send
  }
}

// =============================================================================
// LocalComm - in-process ranks over channels
// =============================================================================

#[derive(Clone, Debug)]
enum Payload {
  I64(Vec<i64>),
  F64(Vec<f64>),
}

/// One rank's endpoint of an in-process communicator.
///
/// Build the full set with [`LocalComm::mesh`] and hand one endpoint to
/// each thread. Channels are unbounded, so sends never block and the
/// lockstep collective pattern cannot deadlock. Messages from a fast
/// peer that belong to a later collective are parked per-sender until
/// their call comes up.
pub struct LocalComm {
  rank: usize,
  senders: Vec<Sender<(usize, Payload)>>,
  receiver: Receiver<(usize, Payload)>,
  parked: RefCell<Vec<VecDeque<Payload>>>,
}

impl LocalComm {
  /// Create `size` fully-connected endpoints, one per rank.
  pub fn mesh(size: usize) -> Vec<LocalComm> {
    let mut senders = Vec::with_capacity(size);
    let mut receivers = Vec::with_capacity(size);
    for _ in 0..size {
      let (tx, rx) = unbounded();
      senders.push(tx);
      receivers.push(rx);
    }
    receivers
      .into_iter()
      .enumerate()
      .map(|(rank, receiver)| LocalComm {
        rank,
        senders: senders.clone(),
        receiver,
        parked: RefCell::new(vec![VecDeque::new(); size]),
      })
      .collect()
  }

  fn send_to(&self, peer: usize, payload: Payload) {
    // endpoints only drop at end of test; a closed peer is not an error
    let _ = self.senders[peer].send((self.rank, payload));
  }

  fn recv_from(&self, peer: usize) -> Payload {
    if let Some(parked) = self.parked.borrow_mut()[peer].pop_front() {
      return parked;
    }
    loop {
      let (from, payload) = self
        .receiver
        .recv()
        .expect("peer rank hung up mid-collective");
      if from == peer {
        return payload;
      }
      self.parked.borrow_mut()[from].push_back(payload);
    }
  }

  /// Send one payload to every peer and collect one from each, indexed
  /// by rank (the self slot holds `own`).
  fn exchange(&self, own: Payload) -> Vec<Payload> {
    for peer in 0..self.size() {
      if peer != self.rank {
        self.send_to(peer, own.clone());
      }
    }
    (0..self.size())
      .map(|peer| {
        if peer == self.rank {
          own.clone()
        } else {
          self.recv_from(peer)
        }
      })
      .collect()
  }

  fn reduce_f64(&self, v: f64, fold: impl Fn(f64, f64) -> f64) -> f64 {
    self
      .exchange(Payload::F64(vec![v]))
      .into_iter()
      .map(|p| match p {
        Payload::F64(values) => values[0],
        Payload::I64(_) => unreachable!("float reduction received ints"),
      })
      .reduce(&fold)
      .unwrap_or(v)
  }

  fn reduce_i64(&self, v: i64, fold: impl Fn(i64, i64) -> i64) -> i64 {
    self
      .exchange(Payload::I64(vec![v]))
      .into_iter()
      .map(|p| match p {
        Payload::I64(values) => values[0],
        Payload::F64(_) => unreachable!("int reduction received floats"),
      })
      .reduce(&fold)
      .unwrap_or(v)
  }
}

impl Collective for LocalComm {
  fn rank(&self) -> usize {
    self.rank
  }

  fn size(&self) -> usize {
    self.senders.len()
  }

  fn all_min_f64(&self, v: f64) -> f64 {
    self.reduce_f64(v, f64::min)
  }

  fn all_max_f64(&self, v: f64) -> f64 {
    self.reduce_f64(v, f64::max)
  }

  fn all_sum_f64(&self, v: f64) -> f64 {
    self.reduce_f64(v, |a, b| a + b)
  }

  fn all_max_i64(&self, v: i64) -> i64 {
    self.reduce_i64(v, i64::max)
  }

  fn all_sum_i64(&self, v: i64) -> i64 {
    self.reduce_i64(v, |a, b| a + b)
  }

  fn bcast_bool(&self, v: bool, root: usize) -> bool {
    if self.rank == root {
      for peer in 0..self.size() {
        if peer != root {
          self.send_to(peer, Payload::I64(vec![v as i64]));
        }
      }
      v
    } else {
      match self.recv_from(root) {
        Payload::I64(values) => values[0] != 0,
        Payload::F64(_) => unreachable!("bool broadcast received floats"),
      }
    }
  }

  fn all_gather_i64(&self, v: i64) -> Vec<i64> {
    self
      .exchange(Payload::I64(vec![v]))
      .into_iter()
      .map(|p| match p {
        Payload::I64(values) => values[0],
        Payload::F64(_) => unreachable!("gather received floats"),
      })
      .collect()
  }

  fn all_to_all_i64(&self, send: &[i64]) -> Vec<i64> {
    debug_assert_eq!(send.len(), self.size());
    for peer in 0..self.size() {
      if peer != self.rank {
        self.send_to(peer, Payload::I64(vec![send[peer]]));
      }
    }
    (0..self.size())
      .map(|peer| {
        if peer == self.rank {
          send[peer]
        } else {
          match self.recv_from(peer) {
            Payload::I64(values) => values[0],
            Payload::F64(_) => unreachable!("all-to-all received floats"),
          }
        }
      })
      .collect()
  }

  fn all_to_all_v_i64(&self, mut send: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    debug_assert_eq!(send.len(), self.size());
    for peer in 0..self.size() {
      if peer != self.rank {
        self.send_to(peer, Payload::I64(std::mem::take(&mut send[peer])));
      }
    }
    (0..self.size())
      .map(|peer| {
        if peer == self.rank {
          std::mem::take(&mut send[peer])
        } else {
          match self.recv_from(peer) {
            Payload::I64(values) => values,
            Payload::F64(_) => unreachable!("all-to-all-v received floats"),
          }
        }
      })
      .collect()
  }

  fn all_to_all_v_f64(&self, mut send: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    debug_assert_eq!(send.len(), self.size());
    for peer in 0..self.size() {
      if peer != self.rank {
        self.send_to(peer, Payload::F64(std::mem::take(&mut send[peer])));
      }
    }
    (0..self.size())
      .map(|peer| {
        if peer == self.rank {
          std::mem::take(&mut send[peer])
        } else {
          match self.recv_from(peer) {
            Payload::F64(values) => values,
            Payload::I64(_) => unreachable!("all-to-all-v received ints"),
          }
        }
      })
      .collect()
  }
}

#[cfg(test)]
#[path = "comm_test.rs"]
mod comm_test;
