// tests/persistence_tests.rs
//
// Checkpoints on disk.
//
// These tests verify:
// 1. A trained run survives save/load with parameters, constants table,
//    run statistics and population intact.
// 2. Truncated files fail with a persistence error instead of a partial run.
// 3. Both neural representations round-trip.

use xcsrl::{ActionType, ConditionType, Config, PersistError, Xcs, XcsError};

fn trained(cfg: Config) -> Xcs {
    let mut xcs = Xcs::new(cfg).unwrap();
    for i in 0..30 {
        let x = [i as f64 / 30.0, 1.0 - i as f64 / 30.0];
        xcs.set_explore(i % 2 == 0);
        xcs.init_trial();
        xcs.init_step();
        let a = xcs.decision(&x);
        let reward = if a == 0 { 1.0 } else { 0.0 };
        xcs.update(&x, a, reward, true);
        xcs.end_step(&x, a, reward);
        xcs.end_trial();
    }
    xcs
}

#[test]
fn test_rectangle_run_round_trips_through_file() {
    let mut cfg = Config::new(2, 1, 2).with_seed(21);
    cfg.general.pop_size = 60;
    cfg.cond.gp_num_cons = 5;
    let xcs = trained(cfg);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.bin");
    let n = xcs.save(&path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), n as u64);

    let back = Xcs::load(&path).unwrap();
    assert_eq!(back.config(), xcs.config());
    assert_eq!(back.config().cond.gp_cons.len(), 5);
    assert_eq!(back.run_state(), xcs.run_state());
    let a: Vec<_> = xcs.population().iter().map(|(_, c)| c.clone()).collect();
    let b: Vec<_> = back.population().iter().map(|(_, c)| c.clone()).collect();
    assert_eq!(a, b);
}

#[test]
fn test_truncated_checkpoint_is_rejected() {
    let mut cfg = Config::new(2, 1, 2).with_seed(4);
    cfg.general.pop_size = 10;
    let xcs = trained(cfg);
    let mut bytes = Vec::new();
    xcs.save_to(&mut bytes).unwrap();

    for cut in [0, 10, 40, bytes.len() / 2, bytes.len() - 1] {
        let err = Xcs::load_from(&bytes[..cut]).unwrap_err();
        assert!(
            matches!(err, XcsError::Persist(PersistError::Truncated { .. })),
            "cut {cut}: {err}"
        );
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
    assert!(matches!(Xcs::load(&path), Err(XcsError::Persist(_))));
}

#[test]
fn test_neural_representations_round_trip() {
    let mut cfg = Config::new(2, 1, 3).with_seed(8);
    cfg.general.pop_size = 20;
    cfg.cond.kind = ConditionType::Neural;
    cfg.act.kind = ActionType::Neural;
    cfg.cond.num_neurons = vec![3];
    cfg.cond.max_neurons = vec![6];
    let xcs = trained(cfg);

    let mut bytes = Vec::new();
    xcs.save_to(&mut bytes).unwrap();
    let back = Xcs::load_from(bytes.as_slice()).unwrap();
    let a: Vec<_> = xcs.population().iter().map(|(_, c)| c.clone()).collect();
    let b: Vec<_> = back.population().iter().map(|(_, c)| c.clone()).collect();
    assert_eq!(a, b);
    assert_eq!(back.config().act.kind, ActionType::Neural);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Xcs::load(dir.path().join("nope.bin")).unwrap_err();
    assert!(matches!(err, XcsError::Persist(PersistError::Io(_))));
}
