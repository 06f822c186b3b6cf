use super::*;

fn on_ranks<F>(size: usize, body: F) -> Vec<std::thread::JoinHandle<()>>
where
  F: Fn(LocalComm) + Send + Sync + Clone + 'static,
{
  LocalComm::mesh(size)
    .into_iter()
    .map(|comm| {
      let body = body.clone();
      std::thread::spawn(move || body(comm))
    })
    .collect()
}

#[test]
fn single_rank_is_identity() {
  let comm = SingleRank;
  assert_eq!(comm.size(), 1);
  assert_eq!(comm.all_min_f64(3.5), 3.5);
  assert_eq!(comm.all_sum_i64(7), 7);
  assert_eq!(comm.all_gather_i64(9), vec![9]);
}

#[test]
fn reductions_agree_across_ranks() {
  let handles = on_ranks(3, |comm| {
    let mine = comm.rank() as f64 + 1.0; // 1, 2, 3
    assert_eq!(comm.all_min_f64(mine), 1.0);
    assert_eq!(comm.all_max_f64(mine), 3.0);
    assert_eq!(comm.all_sum_f64(mine), 6.0);
    assert_eq!(comm.all_sum_i64(comm.rank() as i64), 3);
    assert_eq!(comm.all_gather_i64(comm.rank() as i64 * 10), vec![0, 10, 20]);
  });
  for h in handles {
    h.join().unwrap();
  }
}

#[test]
fn broadcast_takes_root_value() {
  let handles = on_ranks(2, |comm| {
    let mine = comm.rank() == 0;
    assert!(comm.bcast_bool(mine, 0));
    assert!(!comm.bcast_bool(mine, 1));
  });
  for h in handles {
    h.join().unwrap();
  }
}

#[test]
fn all_to_all_v_routes_payloads() {
  let handles = on_ranks(2, |comm| {
    let me = comm.rank() as i64;
    // rank r sends [r, peer] to each peer
    let send: Vec<Vec<i64>> = (0..2).map(|peer| vec![me, peer as i64]).collect();
    let recv = comm.all_to_all_v_i64(send);
    for (peer, payload) in recv.iter().enumerate() {
      assert_eq!(payload, &vec![peer as i64, me]);
    }

    let send: Vec<Vec<f64>> = (0..2).map(|_| vec![me as f64; comm.rank() + 1]).collect();
    let recv = comm.all_to_all_v_f64(send);
    assert_eq!(recv[0], vec![0.0; 1]);
    assert_eq!(recv[1], vec![1.0; 2]);
  });
  for h in handles {
    h.join().unwrap();
  }
}

#[test]
fn back_to_back_collectives_do_not_cross_talk() {
  let handles = on_ranks(3, |comm| {
    for round in 0..50 {
      let v = (comm.rank() as i64 + 1) * (round + 1);
      let max = comm.all_max_i64(v);
      assert_eq!(max, 3 * (round + 1));
    }
  });
  for h in handles {
    h.join().unwrap();
  }
}
