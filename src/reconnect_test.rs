use super::*;

fn policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        delay: Duration::from_secs(2),
        max_attempts,
    }
}

#[test]
fn closed_client_never_retries() {
    let inputs = ReconnectInputs {
        closed: true,
        ..ReconnectInputs::default()
    };
    assert_eq!(policy(3).decide(inputs), Decision::Idle);
}

#[test]
fn disabled_policy_never_retries() {
    let disabled = ReconnectPolicy {
        enabled: false,
        ..policy(3)
    };
    assert_eq!(disabled.decide(ReconnectInputs::default()), Decision::Idle);
}

#[test]
fn scheduled_timer_or_inflight_connect_is_idempotent() {
    let scheduled = ReconnectInputs {
        retry_scheduled: true,
        ..ReconnectInputs::default()
    };
    let connecting = ReconnectInputs {
        connecting: true,
        ..ReconnectInputs::default()
    };
    assert_eq!(policy(3).decide(scheduled), Decision::Idle);
    assert_eq!(policy(3).decide(connecting), Decision::Idle);
}

#[test]
fn retry_increments_attempt_with_fixed_delay() {
    let p = policy(3);
    for attempts in 0..3 {
        let inputs = ReconnectInputs {
            attempts,
            ..ReconnectInputs::default()
        };
        assert_eq!(
            p.decide(inputs),
            Decision::Retry {
                attempt: attempts + 1,
                delay: Duration::from_secs(2)
            }
        );
    }
}

#[test]
fn ceiling_reached_is_exhausted() {
    let inputs = ReconnectInputs {
        attempts: 3,
        ..ReconnectInputs::default()
    };
    assert_eq!(policy(3).decide(inputs), Decision::Exhausted { attempts: 3 });
}

#[test]
fn zero_max_attempts_never_retries() {
    assert_eq!(
        policy(0).decide(ReconnectInputs::default()),
        Decision::Exhausted { attempts: 0 }
    );
}

#[test]
fn policy_from_config() {
    let config = ClientConfig {
        auto_reconnect: false,
        reconnect_delay: Duration::ZERO,
        max_reconnect_attempts: 7,
        ..ClientConfig::default()
    };
    let p = ReconnectPolicy::from(&config);
    assert!(!p.enabled);
    assert_eq!(p.delay, Duration::ZERO);
    assert_eq!(p.max_attempts, 7);
}

#[test]
fn state_reset_clears_streak() {
    let mut state = ReconnectState {
        attempts: 4,
        timer: None,
        exhausted: true,
    };
    state.reset();
    assert_eq!(state.attempts, 0);
    assert!(!state.exhausted);
}
