use super::*;
use crate::messages::type_ids;
use std::time::Duration;

const HOST: &str = "upstream.example";
const PORT: u16 = 1935;

#[test]
fn handshake_completion_announces_window_bandwidth_and_chunk_size() {
    let mut config = ClientSessionConfig::new();
    config.chunk_size = 1111;
    config.window_ack_size = 2222;
    config.peer_bandwidth = 3333;

    let mut deserializer = ChunkDeserializer::new();
    let mut session = ClientSession::new(config);
    let results = session.handshake_completed().unwrap();
    let (responses, events) = split_results(&mut deserializer, results);

    assert_vec_match!(events);
    assert_vec_match!(
        responses,
        (_, RtmpMessage::WindowAcknowledgement { size: 2222 }),
        (
            _,
            RtmpMessage::SetPeerBandwidth {
                size: 3333,
                limit_type: PeerBandwidthLimitType::Dynamic,
            }
        ),
        (_, RtmpMessage::SetChunkSize { size: 1111 }),
    );

    assert_eq!(deserializer.get_max_chunk_size(), 1111);
}

#[test]
fn handshake_cannot_be_completed_twice() {
    let mut session = ClientSession::new(ClientSessionConfig::new());
    session.handshake_completed().unwrap();

    match session.handshake_completed() {
        Err(ClientSessionError::HandshakeAlreadyCompleted) => (),
        x => panic!("Expected handshake error, instead received {:?}", x.map(|_| ())),
    }
}

#[test]
fn requests_made_before_handshake_are_sent_after_it() {
    let mut deserializer = ChunkDeserializer::new();
    let mut session = ClientSession::new(ClientSessionConfig::new());

    let results = session.request_connection(HOST, PORT, "live").unwrap();
    assert_vec_match!(results);

    let results = session.handshake_completed().unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_match!(
        responses,
        (_, RtmpMessage::WindowAcknowledgement { .. }),
        (_, RtmpMessage::SetPeerBandwidth { .. }),
        (_, RtmpMessage::SetChunkSize { .. }),
        (_, RtmpMessage::Amf0Command { command_name, .. }) if command_name == "connect",
    );
}

#[test]
fn connect_request_carries_app_and_urls() {
    let config = ClientSessionConfig::new();
    let (mut session, _, mut deserializer) = start_session(config.clone());

    let results = session.request_connection(HOST, PORT, "live").unwrap();
    let (responses, _) = split_results(&mut deserializer, results);
    assert_eq!(responses.len(), 1, "Expected one response");

    match &responses[0] {
        (
            payload,
            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                command_object: Amf0Value::Object(properties),
                additional_arguments,
            },
        ) => {
            let tc_url = Amf0Value::Utf8String("rtmp://upstream.example:1935/live".to_string());

            assert_eq!(payload.message_stream_id, 0, "Unexpected message stream id");
            assert_eq!(command_name, "connect");
            assert_eq!(*transaction_id, 1.0, "Unexpected transaction id");
            assert!(additional_arguments.is_empty(), "Expected no additional arguments");
            assert_eq!(properties.get("app"), Some(&Amf0Value::Utf8String("live".to_string())));
            assert_eq!(
                properties.get("type"),
                Some(&Amf0Value::Utf8String("nonprivate".to_string()))
            );
            assert_eq!(
                properties.get("flashVer"),
                Some(&Amf0Value::Utf8String(config.flash_version.clone()))
            );
            assert_eq!(properties.get("swfUrl"), Some(&tc_url));
            assert_eq!(properties.get("tcUrl"), Some(&tc_url));
        }

        x => panic!("Expected connect command, instead received {:?}", x),
    }

    assert_eq!(session.state(), ClientState::ConnectRequested);
    assert_eq!(session.pending_transaction_count(), 1);
}

#[test]
fn connect_can_only_be_requested_once() {
    let (mut session, _, _) = start_session(ClientSessionConfig::new());
    session.request_connection(HOST, PORT, "live").unwrap();

    match session.request_connection(HOST, PORT, "live") {
        Err(ClientSessionError::ConnectionAlreadyRequested) => (),
        x => panic!("Expected connection error, instead received {:?}", x.map(|_| ())),
    }
}

#[test]
fn connect_result_raises_accepted_event() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    perform_successful_connect(&mut session, &mut serializer, &mut deserializer);

    assert_eq!(session.state(), ClientState::Connected);
    assert_eq!(session.pending_transaction_count(), 0);
}

#[test]
fn connect_error_raises_rejection_with_status() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    consume_results(&mut deserializer, session.request_connection(HOST, PORT, "live").unwrap());

    let packet = server_command(
        &mut serializer,
        "_error",
        1.0,
        vec![status_object("error", "NetConnection.Connect.Rejected")],
        0,
    );
    let results = session.handle_input(&packet.bytes).unwrap();
    let (_, events) = split_results(&mut deserializer, results);

    assert_vec_match!(
        events,
        ClientSessionEvent::TransactionRejected {
            transaction_id: 1,
            kind: TransactionKind::Connect,
            reason: RejectionReason::ErrorResponse { code: Some(code), .. },
        } if code == "NetConnection.Connect.Rejected",
    );

    assert_eq!(session.state(), ClientState::Idle);
}

#[test]
fn publish_request_runs_create_stream_then_publish_with_key() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    consume_results(&mut deserializer, session.request_connection(HOST, PORT, "live").unwrap());

    let results = session.request_publishing("show", Some("secret")).unwrap();
    assert_vec_match!(results);

    let packet = connect_success_packet(&mut serializer);
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, events) = split_results(&mut deserializer, results);

    assert_vec_match!(events, ClientSessionEvent::ConnectionRequestAccepted);
    assert_vec_match!(
        responses,
        (_, RtmpMessage::Amf0Command { command_name, transaction_id, .. })
            if command_name == "createStream" && *transaction_id == 2.0,
    );

    let packet = server_command(&mut serializer, "_result", 2.0, vec![Amf0Value::Number(7.0)], 0);
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, events) = split_results(&mut deserializer, results);

    assert_vec_match!(events, ClientSessionEvent::StreamCreated { stream_id: 7 });
    assert_vec_match!(
        responses,
        (payload, RtmpMessage::Amf0Command { command_name, additional_arguments, .. })
            if command_name == "publish"
                && payload.message_stream_id == 7
                && additional_arguments == &vec![
                    Amf0Value::Utf8String("show?secret".to_string()),
                    Amf0Value::Utf8String("live".to_string()),
                ],
    );

    assert_eq!(session.state(), ClientState::PublishRequested { stream_id: 7 });
}

#[test]
fn publish_without_key_uses_bare_stream_name() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    perform_successful_connect(&mut session, &mut serializer, &mut deserializer);

    let results = session.request_publishing("show", None).unwrap();
    consume_results(&mut deserializer, results);

    let packet = server_command(&mut serializer, "_result", 2.0, vec![Amf0Value::Number(1.0)], 0);
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_match!(
        responses,
        (_, RtmpMessage::Amf0Command { command_name, additional_arguments, .. })
            if command_name == "publish"
                && additional_arguments[0] == Amf0Value::Utf8String("show".to_string()),
    );
}

#[test]
fn media_is_queued_until_publish_start() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    let stream_id = perform_publish_request(&mut session, &mut serializer, &mut deserializer);

    let results = session
        .publish_media(type_ids::VIDEO, Bytes::from(vec![0x17, 1]), RtmpTimestamp::new(10))
        .unwrap();
    assert_vec_match!(results);

    let results = session
        .publish_media(type_ids::AUDIO, Bytes::from(vec![0xaf, 1]), RtmpTimestamp::new(20))
        .unwrap();
    assert_vec_match!(results);
    assert_eq!(session.queued_media_count(), 2);

    let packet = server_command(
        &mut serializer,
        "onStatus",
        0.0,
        vec![status_object("status", "NetStream.Publish.Start")],
        stream_id,
    );
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, events) = split_results(&mut deserializer, results);

    assert_vec_match!(
        events,
        ClientSessionEvent::PublishRequestAccepted { stream_id: id } if *id == stream_id,
    );
    assert_vec_match!(
        responses,
        (payload, RtmpMessage::VideoData { .. })
            if payload.message_stream_id == stream_id && payload.timestamp == RtmpTimestamp::new(10),
        (payload, RtmpMessage::AudioData { .. })
            if payload.message_stream_id == stream_id && payload.timestamp == RtmpTimestamp::new(20),
    );

    assert_eq!(session.queued_media_count(), 0);
    assert_eq!(session.state(), ClientState::Publishing { stream_id });

    let results = session
        .publish_media(type_ids::VIDEO, Bytes::from(vec![0x27, 1]), RtmpTimestamp::new(30))
        .unwrap();
    let (responses, _) = split_results(&mut deserializer, results);
    assert_vec_match!(responses, (_, RtmpMessage::VideoData { .. }));
}

#[test]
fn stream_begin_for_publishing_stream_releases_media() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    let stream_id = perform_publish_request(&mut session, &mut serializer, &mut deserializer);

    session
        .publish_media(type_ids::VIDEO, Bytes::from(vec![0x17, 1]), RtmpTimestamp::new(0))
        .unwrap();

    let results = session.handle_input(&stream_begin_packet(&mut serializer, 0).bytes).unwrap();
    assert_vec_match!(results);

    let packet = stream_begin_packet(&mut serializer, stream_id);
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_match!(responses, (_, RtmpMessage::VideoData { .. }));
}

#[test]
fn oldest_media_is_dropped_when_queue_is_full() {
    let mut config = ClientSessionConfig::new();
    config.max_queued_media = 2;
    let mut session = ClientSession::new(config);

    for timestamp in 0..3 {
        session
            .publish_media(type_ids::AUDIO, Bytes::from(vec![0xaf]), RtmpTimestamp::new(timestamp))
            .unwrap();
    }

    assert_eq!(session.queued_media_count(), 2);
    assert_eq!(session.queued_media[0].timestamp, RtmpTimestamp::new(1));
}

#[test]
fn publish_error_status_raises_rejection() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    let stream_id = perform_publish_request(&mut session, &mut serializer, &mut deserializer);

    let packet = server_command(
        &mut serializer,
        "onStatus",
        0.0,
        vec![status_object("error", "NetStream.Publish.BadName")],
        stream_id,
    );
    let results = session.handle_input(&packet.bytes).unwrap();
    let (_, events) = split_results(&mut deserializer, results);

    assert_vec_match!(
        events,
        ClientSessionEvent::PublishRequestRejected { code, .. } if code == "NetStream.Publish.BadName",
    );
}

#[test]
fn expired_transaction_is_rejected_and_late_result_discarded() {
    let mut config = ClientSessionConfig::new();
    config.transaction_timeout = Duration::from_millis(50);

    let (mut session, mut serializer, mut deserializer) = start_session(config);
    let requested_at = Instant::now();
    consume_results(&mut deserializer, session.request_connection(HOST, PORT, "live").unwrap());

    let results = session.expire_transactions(requested_at);
    assert_vec_match!(results);

    let results = session.expire_transactions(requested_at + Duration::from_millis(60));
    let (_, events) = split_results(&mut deserializer, results);
    assert_vec_match!(
        events,
        ClientSessionEvent::TransactionRejected {
            transaction_id: 1,
            kind: TransactionKind::Connect,
            reason: RejectionReason::TimedOut,
        },
    );

    let packet = connect_success_packet(&mut serializer);
    let results = session.handle_input(&packet.bytes).unwrap();
    assert_vec_match!(results);
    assert_eq!(session.state(), ClientState::Idle);
}

#[test]
fn expired_create_stream_is_rejected_and_late_result_discarded() {
    let mut config = ClientSessionConfig::new();
    config.transaction_timeout = Duration::from_millis(50);

    let (mut session, mut serializer, mut deserializer) = start_session(config);
    perform_successful_connect(&mut session, &mut serializer, &mut deserializer);

    let requested_at = Instant::now();
    let results = session.request_publishing("show", None).unwrap();
    let (responses, _) = split_results(&mut deserializer, results);
    assert_vec_match!(
        responses,
        (_, RtmpMessage::Amf0Command { command_name, transaction_id, .. })
            if command_name == "createStream" && *transaction_id == 2.0,
    );

    assert_eq!(session.state(), ClientState::CreateStreamRequested);
    assert_vec_match!(session.expire_transactions(requested_at));

    let results = session.expire_transactions(requested_at + Duration::from_millis(60));
    let (_, events) = split_results(&mut deserializer, results);
    assert_vec_match!(
        events,
        ClientSessionEvent::TransactionRejected {
            transaction_id: 2,
            kind: TransactionKind::CreateStream,
            reason: RejectionReason::TimedOut,
        },
    );

    assert_eq!(session.state(), ClientState::Connected);
    assert_eq!(session.pending_transaction_count(), 0);

    let packet = server_command(&mut serializer, "_result", 2.0, vec![Amf0Value::Number(5.0)], 0);
    let results = session.handle_input(&packet.bytes).unwrap();

    assert_vec_match!(results);
    assert_eq!(session.state(), ClientState::Connected);
    assert_eq!(session.pending_transaction_count(), 0);
}

#[test]
fn result_for_unknown_transaction_is_discarded() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    perform_successful_connect(&mut session, &mut serializer, &mut deserializer);

    let packet = server_command(&mut serializer, "_result", 42.0, vec![Amf0Value::Null], 0);
    let results = session.handle_input(&packet.bytes).unwrap();

    assert_vec_match!(results);
    assert_eq!(session.state(), ClientState::Connected);
}

#[test]
fn unknown_server_command_raises_event() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    perform_successful_connect(&mut session, &mut serializer, &mut deserializer);

    let packet = server_command(
        &mut serializer,
        "onFCPublish",
        0.0,
        vec![status_object("status", "NetStream.Publish.Start")],
        0,
    );
    let results = session.handle_input(&packet.bytes).unwrap();
    let (_, events) = split_results(&mut deserializer, results);

    assert_vec_match!(
        events,
        ClientSessionEvent::UnhandleableAmf0Command { command_name, .. } if command_name == "onFCPublish",
    );
}

#[test]
fn passthrough_command_is_sent_as_notification() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    perform_successful_connect(&mut session, &mut serializer, &mut deserializer);

    let results = session
        .send_passthrough_command(
            "FCPublish".to_string(),
            Amf0Value::Null,
            vec![Amf0Value::Utf8String("show".to_string())],
        )
        .unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_match!(
        responses,
        (_, RtmpMessage::Amf0Command { command_name, transaction_id, additional_arguments, .. })
            if command_name == "FCPublish"
                && *transaction_id == 0.0
                && additional_arguments == &vec![Amf0Value::Utf8String("show".to_string())],
    );

    assert_eq!(session.pending_transaction_count(), 0);
}

#[test]
fn stop_publishing_deletes_stream() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    let stream_id = perform_publish_request(&mut session, &mut serializer, &mut deserializer);

    let results = session.stop_publishing().unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_match!(
        responses,
        (_, RtmpMessage::Amf0Command { command_name, additional_arguments, .. })
            if command_name == "deleteStream"
                && additional_arguments == &vec![Amf0Value::Number(stream_id as f64)],
    );

    assert_eq!(session.state(), ClientState::Connected);
}

#[test]
fn automatically_responds_to_ping_requests() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    let message = RtmpMessage::UserControl {
        event_type: UserControlEventType::PingRequest,
        stream_id: None,
        buffer_length: None,
        timestamp: Some(RtmpTimestamp::new(555)),
    };

    let payload = message.into_message_payload(RtmpTimestamp::new(0), 0).unwrap();
    let packet = serializer.serialize(&payload, false).unwrap();
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_match!(
        responses,
        (
            _,
            RtmpMessage::UserControl {
                event_type: UserControlEventType::PingResponse,
                timestamp: Some(timestamp),
                ..
            }
        ) if *timestamp == RtmpTimestamp::new(555),
    );
}

#[test]
fn acknowledgement_sent_after_window_of_bytes_received() {
    let (mut session, mut serializer, mut deserializer) = start_session(ClientSessionConfig::new());
    let window = RtmpMessage::WindowAcknowledgement { size: 10 }
        .into_message_payload(RtmpTimestamp::new(0), 0)
        .unwrap();
    let packet = serializer.serialize(&window, false).unwrap();
    consume_results(&mut deserializer, session.handle_input(&packet.bytes).unwrap());

    let packet = server_command(&mut serializer, "onBWDone", 0.0, vec![], 0);
    let results = session.handle_input(&packet.bytes).unwrap();
    let (responses, _) = split_results(&mut deserializer, results);

    assert_vec_contains!(responses, (_, RtmpMessage::Acknowledgement { .. }));
}

fn start_session(config: ClientSessionConfig) -> (ClientSession, ChunkSerializer, ChunkDeserializer) {
    let mut deserializer = ChunkDeserializer::new();
    let mut session = ClientSession::new(config);
    consume_results(&mut deserializer, session.handshake_completed().unwrap());

    (session, ChunkSerializer::new(), deserializer)
}

fn split_results(
    deserializer: &mut ChunkDeserializer,
    results: Vec<ClientSessionResult>,
) -> (Vec<(MessagePayload, RtmpMessage)>, Vec<ClientSessionEvent>) {
    let mut responses = Vec::new();
    let mut events = Vec::new();

    for result in results {
        match result {
            ClientSessionResult::OutboundResponse(packet) => {
                let payload = deserializer.get_next_message(&packet.bytes).unwrap().unwrap();
                let message = payload.to_rtmp_message().unwrap();
                if let RtmpMessage::SetChunkSize { size } = message {
                    deserializer.set_max_chunk_size(size as usize).unwrap();
                }

                responses.push((payload, message));
            }

            ClientSessionResult::RaisedEvent(event) => events.push(event),
            ClientSessionResult::UnhandleableMessageReceived(payload) => {
                panic!("Unexpected unhandleable message: {:?}", payload)
            }
        }
    }

    (responses, events)
}

fn consume_results(deserializer: &mut ChunkDeserializer, results: Vec<ClientSessionResult>) {
    // Keeps the deserializer's header state in step with the session's serializer
    split_results(deserializer, results);
}

fn status_object(level: &str, code: &str) -> Amf0Value {
    let mut properties = HashMap::new();
    properties.insert("level".to_string(), Amf0Value::Utf8String(level.to_string()));
    properties.insert("code".to_string(), Amf0Value::Utf8String(code.to_string()));
    properties.insert("description".to_string(), Amf0Value::Utf8String("hi".to_string()));
    Amf0Value::Object(properties)
}

fn server_command(
    serializer: &mut ChunkSerializer,
    name: &str,
    transaction_id: f64,
    arguments: Vec<Amf0Value>,
    stream_id: u32,
) -> Packet {
    let message = RtmpMessage::Amf0Command {
        command_name: name.to_string(),
        transaction_id,
        command_object: Amf0Value::Null,
        additional_arguments: arguments,
    };

    let payload = message.into_message_payload(RtmpTimestamp::new(0), stream_id).unwrap();
    serializer.serialize(&payload, false).unwrap()
}

fn stream_begin_packet(serializer: &mut ChunkSerializer, stream_id: u32) -> Packet {
    let message = RtmpMessage::UserControl {
        event_type: UserControlEventType::StreamBegin,
        stream_id: Some(stream_id),
        buffer_length: None,
        timestamp: None,
    };

    let payload = message.into_message_payload(RtmpTimestamp::new(0), 0).unwrap();
    serializer.serialize(&payload, false).unwrap()
}

fn connect_success_packet(serializer: &mut ChunkSerializer) -> Packet {
    server_command(
        serializer,
        "_result",
        1.0,
        vec![status_object("status", "NetConnection.Connect.Success")],
        0,
    )
}

fn perform_successful_connect(
    session: &mut ClientSession,
    serializer: &mut ChunkSerializer,
    deserializer: &mut ChunkDeserializer,
) {
    consume_results(deserializer, session.request_connection(HOST, PORT, "live").unwrap());

    let packet = connect_success_packet(serializer);
    let results = session.handle_input(&packet.bytes).unwrap();
    let (_, events) = split_results(deserializer, results);

    assert_vec_match!(events, ClientSessionEvent::ConnectionRequestAccepted);
}

/// Connects and requests publishing, returning the stream id the server allocated
fn perform_publish_request(
    session: &mut ClientSession,
    serializer: &mut ChunkSerializer,
    deserializer: &mut ChunkDeserializer,
) -> u32 {
    perform_successful_connect(session, serializer, deserializer);
    consume_results(deserializer, session.request_publishing("show", None).unwrap());

    let packet = server_command(serializer, "_result", 2.0, vec![Amf0Value::Number(5.0)], 0);
    consume_results(deserializer, session.handle_input(&packet.bytes).unwrap());

    5
}
