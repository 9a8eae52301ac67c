use std::time::Duration;

use p2p_tictactoe::channel::Channel;
use p2p_tictactoe::config::NegotiatorConfig;
use p2p_tictactoe::descriptor::{Candidate, SessionDescriptor};
use p2p_tictactoe::error::{DescriptorError, NegotiationError};
use p2p_tictactoe::negotiator::{ConnectionNegotiator, NegotiationState};

#[tokio::test(flavor = "multi_thread")]
async fn test_manual_dance_establishes_a_channel() {
    let mut initiator = ConnectionNegotiator::new(NegotiatorConfig::loopback());
    let mut responder = ConnectionNegotiator::new(NegotiatorConfig::loopback());

    // The two pastes of the signaling dance, as the humans would relay them.
    let offer = initiator
        .begin_as_initiator()
        .await
        .unwrap()
        .to_blob()
        .unwrap();
    assert_eq!(initiator.state(), NegotiationState::AwaitingRemoteAnswer);

    let answer = responder
        .begin_as_responder(&offer)
        .await
        .unwrap()
        .to_blob()
        .unwrap();
    assert_eq!(responder.state(), NegotiationState::Complete);

    initiator.complete_as_initiator(&answer).await.unwrap();
    assert_eq!(initiator.state(), NegotiationState::Complete);
    assert_eq!(initiator.session_id(), responder.session_id());

    let (a, b) = tokio::join!(initiator.wait_channel(), responder.wait_channel());
    let mut a = a.unwrap();
    let mut b = b.unwrap();

    // The channel carries traffic both ways.
    a.send("ping").await.unwrap();
    assert_eq!(b.recv().await.unwrap(), "ping");
    b.send("pong").await.unwrap();
    assert_eq!(a.recv().await.unwrap(), "pong");

    // The channel is handed out exactly once.
    let err = initiator.wait_channel().await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_answer_rejected_then_retried() {
    let mut initiator = ConnectionNegotiator::new(NegotiatorConfig::loopback());
    let mut responder = ConnectionNegotiator::new(NegotiatorConfig::loopback());

    let offer = initiator.begin_as_initiator().await.unwrap();
    let genuine = responder
        .begin_as_responder(&offer.to_blob().unwrap())
        .await
        .unwrap();

    // An answer from some other negotiation: right shape, wrong session.
    let foreign =
        SessionDescriptor::answer(offer.session.wrapping_add(1), genuine.candidates.clone());
    let err = initiator
        .complete_as_initiator(&foreign.to_blob().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::Descriptor(DescriptorError::SessionMismatch { .. })
    ));

    // The bad paste cost nothing: the genuine answer still goes through.
    assert_eq!(initiator.state(), NegotiationState::AwaitingRemoteAnswer);
    initiator
        .complete_as_initiator(&genuine.to_blob().unwrap())
        .await
        .unwrap();

    let (a, b) = tokio::join!(initiator.wait_channel(), responder.wait_channel());
    assert!(a.is_ok());
    assert!(b.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_descriptor_confusion_rejected() {
    let mut initiator = ConnectionNegotiator::new(NegotiatorConfig::loopback());
    let mut responder = ConnectionNegotiator::new(NegotiatorConfig::loopback());

    // An answer pasted where an offer belongs.
    let stray_answer =
        SessionDescriptor::answer(1, vec![Candidate::host("127.0.0.1:9".parse().unwrap())]);
    let err = responder
        .begin_as_responder(&stray_answer.to_blob().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::Descriptor(DescriptorError::UnexpectedKind { .. })
    ));
    assert_eq!(responder.state(), NegotiationState::Idle);

    // Clipboard lint instead of a descriptor.
    let err = responder.begin_as_responder("not a blob").await.unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::Descriptor(DescriptorError::Malformed(_))
    ));
    assert_eq!(responder.state(), NegotiationState::Idle);

    // The initiator's own offer pasted back as the answer.
    let offer_blob = initiator
        .begin_as_initiator()
        .await
        .unwrap()
        .to_blob()
        .unwrap();
    let err = initiator
        .complete_as_initiator(&offer_blob)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::Descriptor(DescriptorError::UnexpectedKind { .. })
    ));
    assert_eq!(initiator.state(), NegotiationState::AwaitingRemoteAnswer);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_operations_out_of_order_are_invalid() {
    let mut negotiator = ConnectionNegotiator::new(NegotiatorConfig::loopback());

    // Nothing has begun yet.
    let err = negotiator.complete_as_initiator("{}").await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState { .. }));
    let err = negotiator.wait_channel().await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState { .. }));
    assert!(err.to_string().contains("wait_channel"));

    // A begun negotiator cannot begin again in either direction.
    negotiator.begin_as_initiator().await.unwrap();
    let err = negotiator.begin_as_initiator().await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState { .. }));
    let err = negotiator.begin_as_responder("{}").await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState { .. }));
    assert_eq!(negotiator.state(), NegotiationState::AwaitingRemoteAnswer);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_timeout_when_peer_stays_mute() {
    let config = NegotiatorConfig {
        open_timeout: Duration::from_millis(200),
        ..NegotiatorConfig::loopback()
    };
    let mut initiator = ConnectionNegotiator::new(config);
    let offer = initiator.begin_as_initiator().await.unwrap();

    // A live port that accepts the dial and then never says a word, so
    // the preamble can never finish.
    let mute = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let answer = SessionDescriptor::answer(
        offer.session,
        vec![Candidate::host(mute.local_addr().unwrap())],
    );
    initiator
        .complete_as_initiator(&answer.to_blob().unwrap())
        .await
        .unwrap();

    let err = initiator.wait_channel().await.unwrap_err();
    assert!(matches!(err, NegotiationError::OpenTimedOut(_)));
}
