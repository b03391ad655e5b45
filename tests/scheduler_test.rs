use buffered_storage::{
    config::Configuration,
    scheduler::{decide, CommitReason, SaveDecision, DEFAULT_SAVE_THRESHOLD},
};

#[test]
fn nothing_dirty_means_nothing_to_commit() {
    assert_eq!(decide(0, 0, DEFAULT_SAVE_THRESHOLD), SaveDecision::Clean);
    assert_eq!(decide(7, 0, DEFAULT_SAVE_THRESHOLD), SaveDecision::Clean);
    // Even a zero threshold does not commit an empty context.
    assert_eq!(decide(0, 0, 0), SaveDecision::Clean);
}

#[test]
fn commit_waits_for_the_burst_to_end() {
    assert_eq!(decide(3, 42, DEFAULT_SAVE_THRESHOLD), SaveDecision::Defer);
    assert_eq!(
        decide(0, 42, DEFAULT_SAVE_THRESHOLD),
        SaveDecision::Commit(CommitReason::Idle)
    );
}

#[test]
fn threshold_forces_a_commit_mid_burst() {
    assert_eq!(decide(4, 1, 2), SaveDecision::Defer);
    assert_eq!(decide(3, 2, 2), SaveDecision::Commit(CommitReason::Threshold));
    assert_eq!(
        decide(100, DEFAULT_SAVE_THRESHOLD + 1, DEFAULT_SAVE_THRESHOLD),
        SaveDecision::Commit(CommitReason::Threshold)
    );
}

#[test]
fn default_configuration() {
    let configuration = Configuration::default();
    assert_eq!(configuration.save_threshold, 500);
    assert_eq!(configuration.storage_label, "storage");
    assert!(!configuration.log_events);
}
