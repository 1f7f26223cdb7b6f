use std::sync::{Arc, Barrier};

use peer_av::calls::{
    AnswerError, CallError, CallRegistry, CallSession, CallTransition, ControlError, RegistryError,
};
use peer_av::loopback::LoopbackNetwork;
use peer_av::{AvConfig, AvSession, CallControl, FriendNumber};
use proptest::prelude::*;

const BOB: FriendNumber = FriendNumber(1);
const ALICE: FriendNumber = FriendNumber(0);

#[derive(Debug, Clone, Copy)]
enum Op {
    AliceCalls,
    BobCalls,
    AliceAnswers,
    BobAnswers,
    AliceCancels,
    BobCancels,
    AliceIterates,
    BobIterates,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::AliceCalls),
        Just(Op::BobCalls),
        Just(Op::AliceAnswers),
        Just(Op::BobAnswers),
        Just(Op::AliceCancels),
        Just(Op::BobCancels),
        Just(Op::AliceIterates),
        Just(Op::BobIterates),
    ]
}

fn busy(session: &AvSession, friend: FriendNumber) -> bool {
    session
        .session(friend)
        .is_some_and(|s| !s.state.is_terminal())
}

fn place_call(session: &AvSession, friend: FriendNumber) -> Result<(), TestCaseError> {
    let before = session.session(friend);
    let was_busy = busy(session, friend);
    match session.call(friend, 64, 0) {
        Ok(()) => prop_assert!(!was_busy, "call succeeded on a busy friend"),
        Err(CallError::FriendAlreadyInCall(_)) => {
            prop_assert!(was_busy);
            let after = session.session(friend);
            prop_assert_eq!(
                before.map(|s| (s.state, s.audio_bit_rate, s.video_bit_rate)),
                after.map(|s| (s.state, s.audio_bit_rate, s.video_bit_rate))
            );
        }
        Err(e) => prop_assert!(false, "unexpected call error: {}", e),
    }
    Ok(())
}

/// Alice and Bob, each with a session on a linked loopback network.
fn linked_sessions() -> (Arc<AvSession>, Arc<AvSession>) {
    let alice_net = LoopbackNetwork::new();
    let bob_net = LoopbackNetwork::new();
    LoopbackNetwork::connect(&alice_net, BOB, &bob_net, ALICE);
    let alice = Arc::new(AvSession::new(alice_net, AvConfig::default()).unwrap());
    let bob = Arc::new(AvSession::new(bob_net, AvConfig::default()).unwrap());
    (alice, bob)
}

/// Run one op from a worker thread. Only errors a racing peer can cause
/// are tolerated.
fn run_concurrent(op: Op, alice: &AvSession, bob: &AvSession) -> Result<(), String> {
    let (session, friend) = match op {
        Op::AliceCalls | Op::AliceAnswers | Op::AliceCancels | Op::AliceIterates => {
            (alice, BOB)
        }
        _ => (bob, ALICE),
    };
    match op {
        Op::AliceCalls | Op::BobCalls => match session.call(friend, 64, 0) {
            Ok(()) | Err(CallError::FriendAlreadyInCall(_)) => Ok(()),
            Err(e) => Err(format!("call: {}", e)),
        },
        Op::AliceAnswers | Op::BobAnswers => match session.answer(friend, 64, 0) {
            Ok(_) | Err(AnswerError::FriendNotCalling(_)) => Ok(()),
            Err(e) => Err(format!("answer: {}", e)),
        },
        Op::AliceCancels | Op::BobCancels => {
            match session.control(friend, CallControl::Cancel) {
                Ok(_) | Err(ControlError::FriendNotInCall(_)) => Ok(()),
                Err(e) => Err(format!("cancel: {}", e)),
            }
        }
        Op::AliceIterates | Op::BobIterates => {
            session.iterate();
            Ok(())
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn concurrent_ops_keep_sessions_consistent(
        workers in prop::collection::vec(prop::collection::vec(op(), 1..40), 2..5)
    ) {
        let (alice, bob) = linked_sessions();
        let start = Barrier::new(workers.len());

        let failures: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = workers
                .iter()
                .map(|ops| {
                    let (alice, bob, start) = (&alice, &bob, &start);
                    s.spawn(move || {
                        start.wait();
                        ops.iter()
                            .filter_map(|op| run_concurrent(*op, alice, bob).err())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        prop_assert!(failures.is_empty(), "unexpected errors: {:?}", failures);

        // Invites still in flight can ring again, so hang up until both
        // inboxes are drained.
        for _ in 0..8 {
            alice.iterate();
            bob.iterate();
            let _ = alice.control(BOB, CallControl::Cancel);
            let _ = bob.control(ALICE, CallControl::Cancel);
        }
        alice.iterate();
        bob.iterate();
        prop_assert!(alice.session(BOB).is_none());
        prop_assert!(bob.session(ALICE).is_none());
        prop_assert!(alice.call(BOB, 64, 0).is_ok());
    }

    #[test]
    fn simultaneous_calls_have_one_winner(callers in 2usize..8) {
        let (alice, _bob) = linked_sessions();
        let start = Barrier::new(callers);

        let results: Vec<Result<(), CallError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    let (alice, start) = (&alice, &start);
                    s.spawn(move || {
                        start.wait();
                        alice.call(BOB, 64, 0)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        prop_assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        prop_assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CallError::FriendAlreadyInCall(f) if *f == BOB)));
        prop_assert!(busy(&alice, BOB));
    }
}

proptest! {
    #[test]
    fn at_most_one_live_call_per_friend(ops in prop::collection::vec(op(), 1..60)) {
        let (alice, bob) = linked_sessions();

        for op in ops {
            match op {
                Op::AliceCalls => place_call(&alice, BOB)?,
                Op::BobCalls => place_call(&bob, ALICE)?,
                Op::AliceAnswers => {
                    let _ = alice.answer(BOB, 64, 0);
                }
                Op::BobAnswers => {
                    let _ = bob.answer(ALICE, 64, 0);
                }
                Op::AliceCancels => {
                    let _ = alice.control(BOB, CallControl::Cancel);
                }
                Op::BobCancels => {
                    let _ = bob.control(ALICE, CallControl::Cancel);
                }
                Op::AliceIterates => {
                    alice.iterate();
                }
                Op::BobIterates => {
                    bob.iterate();
                }
            }
        }
    }

    #[test]
    fn registry_create_is_test_and_set(
        steps in prop::collection::vec((0u32..4, any::<bool>()), 1..80)
    ) {
        let mut registry = CallRegistry::new();
        for (friend, cancel) in steps {
            let friend = FriendNumber(friend);
            let live_before = registry.is_in_call(friend);

            if cancel {
                if let Some(session) = registry.get_mut(friend) {
                    let _ = session.apply_transition(CallTransition::Cancel);
                }
                continue;
            }

            match registry.create(CallSession::new_outgoing(friend, 64, 0)) {
                Ok(session) => {
                    prop_assert!(!live_before);
                    prop_assert_eq!(session.friend_number, friend);
                }
                Err(RegistryError::AlreadyInCall(f)) => {
                    prop_assert!(live_before);
                    prop_assert_eq!(f, friend);
                }
                Err(RegistryError::Malloc) => prop_assert!(false, "allocation failed"),
            }
            prop_assert!(registry.len() <= 4);
        }
        registry.reap();
        prop_assert!(registry.iter().all(|s| !s.state.is_terminal()));
    }
}
