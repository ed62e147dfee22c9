//! Client-built programs executed end-to-end by the dispatcher against a
//! scripted backend.

use bytes::Bytes;
use client::{MessageBuilder, RecordingSink};
use codec::{MessageHeader, MessageType, TargetQubitHeader, Wire};
use dispatch::CommandDispatcher;
use qcp_e2e_tests::{init_tracing, SimBackend};

const APP_ID: u16 = 0;

fn new_client() -> MessageBuilder<RecordingSink> {
    MessageBuilder::new(RecordingSink::default(), APP_ID)
}

/// Feed every committed frame to the dispatcher; returns the replies of
/// the last frame.
async fn run(
    dispatcher: &mut CommandDispatcher<SimBackend>,
    builder: &mut MessageBuilder<RecordingSink>,
) -> Vec<Bytes> {
    let frames = std::mem::take(&mut builder.sink_mut().messages);
    let mut last = Vec::new();
    for frame in &frames {
        last = dispatcher.handle_frame(frame).await.unwrap();
    }
    last
}

fn reply_types(replies: &[Bytes]) -> Vec<MessageType> {
    replies
        .iter()
        .map(|bytes| MessageHeader::decode(bytes).unwrap().message_type().unwrap())
        .collect()
}

#[tokio::test]
async fn conditional_program_takes_the_if_branch() {
    init_tracing();
    let backend = SimBackend::new();
    backend.script_outcomes(&[1]);
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    let q = builder.new_qubit().unwrap();
    builder
        .mix(|program| {
            let outcome = program.measure_inplace(q)?;
            program.if_(outcome.equals(1), |body| body.x(q))?;
            program.else_(|body| body.h(q))
        })
        .unwrap();

    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(reply_types(&replies), vec![MessageType::Done]);
    assert_eq!(
        backend.log(),
        vec!["new -> 1", "measure(1) -> 1", "X(1)"]
    );
}

#[tokio::test]
async fn conditional_program_takes_the_else_branch() {
    init_tracing();
    let backend = SimBackend::new();
    backend.script_outcomes(&[0]);
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    let q = builder.new_qubit().unwrap();
    builder
        .mix(|program| {
            let outcome = program.measure_inplace(q)?;
            program.if_(outcome.equals(1), |body| body.x(q))?;
            program.else_(|body| body.h(q))
        })
        .unwrap();

    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(reply_types(&replies), vec![MessageType::Done]);
    assert_eq!(
        backend.log(),
        vec!["new -> 1", "measure(1) -> 0", "H(1)"]
    );
}

#[tokio::test]
async fn embedded_loop_repeats_on_the_backend_not_the_wire() {
    init_tracing();
    let backend = SimBackend::new();
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    let q = builder.new_qubit().unwrap();
    builder
        .mix(|program| program.loop_(3, |body| body.h(q)))
        .unwrap();

    // One H on the wire...
    let mix_frame = &builder.sink().messages[1];
    assert_eq!(
        MessageHeader::decode(mix_frame).unwrap().length,
        5 + 2 + 4 // type announcement + factory header + one command
    );

    // ...three on the backend.
    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(reply_types(&replies), vec![MessageType::Done]);
    assert_eq!(backend.log(), vec!["new -> 1", "H(1)", "H(1)", "H(1)"]);
}

#[tokio::test]
async fn bit_flip_correction_runs_only_on_double_failure() {
    init_tracing();

    for (outcomes, expect_correction) in [
        (vec![1u8, 1u8], true),
        (vec![1u8, 0u8], false),
        (vec![0u8], false),
    ] {
        let backend = SimBackend::new();
        backend.script_outcomes(&outcomes);
        let mut dispatcher = CommandDispatcher::new(backend.clone());
        let mut builder = new_client();

        let q1 = builder.new_qubit().unwrap();
        let q2 = builder.new_qubit().unwrap();
        let q3 = builder.new_qubit().unwrap();
        builder
            .mix(|program| {
                program.cnot(q1, q2)?;
                let syndrome1 = program.measure_inplace(q2)?;
                program.if_(syndrome1.equals(1), |outer| {
                    outer.cnot(q1, q3)?;
                    let syndrome2 = outer.measure_inplace(q3)?;
                    outer.if_(syndrome2.equals(1), |inner| inner.x(q1))
                })
            })
            .unwrap();

        let replies = run(&mut dispatcher, &mut builder).await;
        assert_eq!(reply_types(&replies), vec![MessageType::Done]);

        let ran_correction = backend.log().iter().any(|entry| entry == "X(1)");
        assert_eq!(ran_correction, expect_correction, "outcomes {:?}", outcomes);

        // A false outer conditional skips the whole nested body.
        if outcomes == [0] {
            assert!(!backend.log().iter().any(|entry| entry.starts_with("Cnot(1, 3")));
        }
    }
}

#[tokio::test]
async fn flush_factory_repeats_pending_commands() {
    init_tracing();
    let backend = SimBackend::new();
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    let q = builder.new_qubit().unwrap();
    builder.set_pending(true).unwrap();
    builder.h(q).unwrap();
    builder.flush_factory(4, false).unwrap();

    let replies = run(&mut dispatcher, &mut builder).await;
    // H carries notify, so the factory notify bit is set.
    assert_eq!(reply_types(&replies), vec![MessageType::Done]);
    assert_eq!(backend.log(), vec!["new -> 1", "H(1)", "H(1)", "H(1)", "H(1)"]);
}

#[tokio::test]
async fn allocation_returns_one_new_ok_per_qubit() {
    init_tracing();
    let backend = SimBackend::new();
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    let qubits = builder.allocate(3).unwrap();
    assert_eq!(qubits.len(), 3);

    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(
        reply_types(&replies),
        vec![
            MessageType::NewOk,
            MessageType::NewOk,
            MessageType::NewOk,
            MessageType::Done
        ]
    );

    // The backend ids travel in the reply payloads and match the client's
    // sequential prediction.
    for (reply, qubit) in replies[..3].iter().zip(&qubits) {
        let id = TargetQubitHeader::decode(&reply[MessageHeader::WIRE_SIZE..])
            .unwrap()
            .qubit_id;
        assert_eq!(id, qubit.id());
    }
}

#[tokio::test]
async fn stale_handle_yields_a_single_unknown_reply() {
    init_tracing();
    let backend = SimBackend::new();
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    // A handle the backend never created.
    let ghost = builder.register_qubit(50);
    builder.h(ghost).unwrap();

    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(reply_types(&replies), vec![MessageType::ErrUnknown]);
}

#[tokio::test]
async fn hello_round_trip() {
    init_tracing();
    let backend = SimBackend::new();
    let mut dispatcher = CommandDispatcher::new(backend);
    let mut builder = new_client();

    builder.hello().unwrap();
    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(reply_types(&replies), vec![MessageType::Hello]);
}

#[tokio::test]
async fn send_and_epr_round_trip() {
    init_tracing();
    let backend = SimBackend::new();
    let mut dispatcher = CommandDispatcher::new(backend.clone());
    let mut builder = new_client();

    let q = builder.new_qubit().unwrap();
    builder.send_qubit(q, 3, 0x0A000002, 8001).unwrap();
    let _pair = builder.create_epr(3, 0x0A000002, 8001).unwrap();

    let replies = run(&mut dispatcher, &mut builder).await;
    assert_eq!(
        reply_types(&replies),
        vec![MessageType::EprOk, MessageType::Done]
    );
    assert_eq!(
        backend.log(),
        vec!["new -> 1", "send(1) -> node 167772162", "epr(node 167772162) -> 2"]
    );
}
