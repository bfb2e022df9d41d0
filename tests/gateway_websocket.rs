mod common;

use std::time::Duration;

use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use common::*;
use ws_asr_gateway::config::{ProtocolConfig, ResponseSchema, UnknownCommandPolicy};
use ws_asr_gateway::monitoring::GatewayMetrics;
use ws_asr_gateway::server::{CloseReason, ConnectionError, Shutdown};
use ws_asr_gateway::session::SessionTracker;

#[tokio::test]
async fn connection_message_lists_engines() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (client, server, welcome) = connect_active(&supervisor, "/asr").await;

    assert_eq!(welcome["status"], "connected");
    assert_eq!(welcome["sample_rate"], 16_000);
    assert_eq!(welcome["current_language"], "cn");
    assert_eq!(welcome["available_languages"], json!(["cn", "en"]));
    assert!(welcome["session_id"].as_str().is_some_and(|id| !id.is_empty()));

    finish(client, server).await;
}

#[tokio::test]
async fn query_selects_engine_and_sample_rate() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (client, server, welcome) =
        connect_active(&supervisor, "/asr?language=en&sample_rate=8000").await;

    assert_eq!(welcome["current_language"], "en");
    assert_eq!(welcome["sample_rate"], 8_000);
    assert_eq!(gw.cn.created(), 0);
    assert_eq!(gw.en.created(), 1);

    finish(client, server).await;
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_text(&mut client, r#"{"type":"ping"}"#).await;
    assert_eq!(
        recv_json(&mut client).await,
        json!({"type": "command_response", "command": "ping", "status": "pong"})
    );

    // 旧形式の `command` フィールド
    send_text(&mut client, r#"{"command":"ping"}"#).await;
    assert_eq!(recv_json(&mut client).await["status"], "pong");

    finish(client, server).await;
}

#[tokio::test]
async fn switch_then_transcribe_hello() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/asr").await;

    send_text(&mut client, r#"{"type":"switch_language","language":"en"}"#).await;
    let ack = recv_json(&mut client).await;
    assert_eq!(ack["type"], "command_response");
    assert_eq!(ack["command"], "switch_language");
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["language"], "en");

    send_audio(&mut client, b"hel").await;
    let partial = recv_json(&mut client).await;
    assert_eq!(partial["type"], "asr_result");
    assert_eq!(partial["text"], "hel");
    assert_eq!(partial["is_final"], false);
    assert_eq!(partial["language"], "en");
    assert!(partial.get("confidence").is_none());
    assert!(partial.get("timestamp").is_none());

    send_audio(&mut client, b"lo\n").await;
    let result = recv_json(&mut client).await;
    assert_eq!(result["text"], "hello");
    assert_eq!(result["is_final"], true);
    assert_eq!(result["language"], "en");
    assert_eq!(result["confidence"], 1.0);
    assert!(result["timestamp"].as_f64().is_some_and(|ts| ts > 0.0));

    finish(client, server).await;
    assert_eq!(gw.cn.created(), 1);
    assert_eq!(gw.cn.live(), 0);
    assert_eq!(gw.en.created(), 1);
    assert_eq!(gw.en.live(), 0);
}

#[tokio::test]
async fn switch_discards_partial_hypothesis() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_audio(&mut client, b"hel").await;
    assert_eq!(recv_json(&mut client).await["text"], "hel");

    send_text(&mut client, r#"{"type":"switch_language","language":"en"}"#).await;
    assert_eq!(recv_json(&mut client).await["status"], "success");

    send_audio(&mut client, b"lo\n").await;
    let result = recv_json(&mut client).await;
    assert_eq!(result["text"], "lo");
    assert_eq!(result["language"], "en");

    finish(client, server).await;
}

#[tokio::test]
async fn unknown_switch_key_keeps_engine() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_audio(&mut client, b"ni").await;
    assert_eq!(recv_json(&mut client).await["text"], "ni");

    send_text(&mut client, r#"{"type":"switch_language","language":"fr"}"#).await;
    let ack = recv_json(&mut client).await;
    assert_eq!(ack["status"], "error");
    assert_eq!(ack["available_languages"], json!(["cn", "en"]));
    assert_eq!(ack["message"], "Language 'fr' not available. Available: [cn, en]");

    // キーが無い場合は空キー扱い
    send_text(&mut client, r#"{"type":"switch_language"}"#).await;
    assert_eq!(recv_json(&mut client).await["status"], "error");

    // 認識器も仮説もそのまま
    send_audio(&mut client, b"hao\n").await;
    let result = recv_json(&mut client).await;
    assert_eq!(result["text"], "nihao");
    assert_eq!(result["language"], "cn");

    finish(client, server).await;
    assert_eq!(gw.cn.created(), 1);
    assert_eq!(gw.en.created(), 0);
}

#[tokio::test]
async fn get_languages_reports_current_and_available() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_text(&mut client, r#"{"type":"get_languages"}"#).await;
    assert_eq!(
        recv_json(&mut client).await,
        json!({
            "type": "command_response",
            "command": "get_languages",
            "status": "success",
            "current_language": "cn",
            "available_languages": ["cn", "en"],
        })
    );

    finish(client, server).await;
}

#[tokio::test]
async fn malformed_json_yields_one_error() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_audio(&mut client, b"ab").await;
    assert_eq!(recv_json(&mut client).await["text"], "ab");

    send_text(&mut client, "{not json").await;
    assert_eq!(
        recv_json(&mut client).await,
        json!({"type": "error", "message": "invalid command payload"})
    );
    send_text(&mut client, "[1, 2]").await;
    assert_eq!(recv_json(&mut client).await["type"], "error");

    // 直後が pong なら余分なイベントは出ていない
    roundtrip_ping(&mut client).await;

    send_audio(&mut client, b"c\n").await;
    let result = recv_json(&mut client).await;
    assert_eq!(result["text"], "abc");
    assert_eq!(result["language"], "cn");

    finish(client, server).await;
    assert_eq!(gw.cn.created(), 1);
}

#[tokio::test]
async fn unknown_command_rejected_by_default() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_text(&mut client, r#"{"type":"dance"}"#).await;
    assert_eq!(
        recv_json(&mut client).await,
        json!({"type": "error", "message": "unknown command: dance"})
    );
    roundtrip_ping(&mut client).await;

    finish(client, server).await;
}

#[tokio::test]
async fn unknown_command_ignored_when_configured() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig {
        schema: ResponseSchema::Language,
        unknown_commands: UnknownCommandPolicy::Ignore,
    });
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_text(&mut client, r#"{"type":"dance"}"#).await;
    roundtrip_ping(&mut client).await;

    finish(client, server).await;
}

#[tokio::test]
async fn decode_fault_keeps_connection_open() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_audio(&mut client, &[0xff, 0xfe, 0xfd]).await;
    let err = recv_json(&mut client).await;
    assert_eq!(err["type"], "error");
    assert!(err["message"]
        .as_str()
        .is_some_and(|m| m.starts_with("audio processing error")));

    send_audio(&mut client, b"ok\n").await;
    let result = recv_json(&mut client).await;
    assert_eq!(result["text"], "ok");
    assert_eq!(result["is_final"], true);

    let summary = finish(client, server).await;
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.reason, CloseReason::ClientClosed);
}

#[tokio::test]
async fn results_follow_frame_order_and_skip_blank_text() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    for frame in ["a", "b", "c\n", "  ", "\n", "d"] {
        send_audio(&mut client, frame.as_bytes()).await;
    }
    roundtrip_ping_after(&mut client, &[("a", false), ("ab", false), ("abc", true), ("d", false)]).await;

    finish(client, server).await;
}

/// 期待する結果列を順に受け取り、最後に ping で余分なイベントが無いことを確かめる
async fn roundtrip_ping_after(client: &mut Client, expected: &[(&str, bool)]) {
    for (text, is_final) in expected {
        let result = recv_json(client).await;
        assert_eq!(result["type"], "asr_result");
        assert_eq!(result["text"], *text);
        assert_eq!(result["is_final"], *is_final);
    }
    roundtrip_ping(client).await;
}

#[tokio::test]
async fn reset_replaces_recognizer() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;

    send_audio(&mut client, b"abc").await;
    assert_eq!(recv_json(&mut client).await["text"], "abc");

    send_text(&mut client, r#"{"type":"reset"}"#).await;
    assert_eq!(
        recv_json(&mut client).await,
        json!({"type": "command_response", "command": "reset", "status": "success"})
    );
    assert_eq!(gw.cn.created(), 2);
    assert_eq!(gw.cn.live(), 1);

    send_audio(&mut client, b"d\n").await;
    assert_eq!(recv_json(&mut client).await["text"], "d");

    let summary = finish(client, server).await;
    assert_eq!(summary.commands, 1);
    assert_eq!(gw.cn.released(), 2);
}

#[tokio::test]
async fn disconnect_mid_stream_releases_recognizer_once() {
    let gw = MockGateway::new();
    let tracker = SessionTracker::new();
    let supervisor = gw
        .supervisor(ProtocolConfig::default())
        .with_tracker(tracker.clone());
    let (mut client, server, welcome) = connect_active(&supervisor, "/").await;
    let session_id = welcome["session_id"].as_str().unwrap().to_string();
    assert!(tracker.contains(&session_id));

    send_audio(&mut client, b"half an utter").await;
    assert_eq!(recv_json(&mut client).await["is_final"], false);

    // Close を送らずに切断
    drop(client);
    let summary = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server task finished")
        .unwrap()
        .unwrap();

    assert_eq!(summary.session_id, session_id);
    assert!(matches!(
        summary.reason,
        CloseReason::TransportFault(_) | CloseReason::ClientClosed
    ));
    assert_eq!(gw.cn.created(), 1);
    assert_eq!(gw.cn.released(), 1);
    assert_eq!(gw.cn.live(), 0);
    assert!(!tracker.contains(&session_id));
    assert_eq!(tracker.active_sessions(), 0);
}

#[tokio::test]
async fn unknown_initial_engine_closes_connection() {
    let gw = MockGateway::new();
    let metrics = GatewayMetrics::new().unwrap();
    let supervisor = gw
        .supervisor(ProtocolConfig::default())
        .with_metrics(metrics.clone());
    let (mut client, server) = connect(&supervisor, "/asr?language=xx", Shutdown::never()).await;

    let err = recv_json(&mut client).await;
    assert_eq!(err["type"], "error");
    assert!(err["message"].as_str().is_some_and(|m| m.contains("'xx'")));
    let frame = recv_close(&mut client).await.expect("close frame");
    assert_eq!(frame.code, CloseCode::Error);

    let outcome = server.await.unwrap();
    assert!(matches!(outcome, Err(ConnectionError::EngineUnavailable(_))));
    assert_eq!(gw.cn.created(), 0);
    assert_eq!(gw.en.created(), 0);
    assert_eq!(metrics.active_sessions(), 0);
    assert!(metrics
        .render()
        .unwrap()
        .contains("asr_gateway_connections_rejected_total 1"));
}

#[tokio::test]
async fn shutdown_sends_close_frame() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (trigger, shutdown) = Shutdown::channel();
    let (mut client, server) = connect(&supervisor, "/", shutdown).await;
    assert_eq!(recv_json(&mut client).await["type"], "connection");

    send_audio(&mut client, b"pending").await;
    assert_eq!(recv_json(&mut client).await["text"], "pending");

    trigger.trigger();
    let frame = recv_close(&mut client).await.expect("close frame");
    assert_eq!(frame.code, CloseCode::Away);

    let summary = server.await.unwrap().unwrap();
    assert_eq!(summary.reason, CloseReason::Shutdown);
    assert_eq!(gw.cn.live(), 0);
}

#[tokio::test]
async fn model_schema_uses_model_fields() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig {
        schema: ResponseSchema::Model,
        unknown_commands: UnknownCommandPolicy::Reject,
    });
    let (mut client, server, welcome) = connect_active(&supervisor, "/").await;
    assert_eq!(welcome["current_model"], "cn");
    assert_eq!(welcome["available_models"], json!(["cn", "en"]));
    assert!(welcome.get("current_language").is_none());

    send_text(&mut client, r#"{"type":"switch_model","model":"en"}"#).await;
    let ack = recv_json(&mut client).await;
    assert_eq!(ack["command"], "switch_model");
    assert_eq!(ack["model"], "en");

    send_text(&mut client, r#"{"type":"switch_model","model":"de"}"#).await;
    let rejected = recv_json(&mut client).await;
    assert_eq!(rejected["status"], "error");
    assert_eq!(rejected["message"], "Model 'de' not available. Available: [cn, en]");

    send_audio(&mut client, b"hi\n").await;
    let result = recv_json(&mut client).await;
    assert_eq!(result["model"], "en");
    assert!(result.get("language").is_none());

    finish(client, server).await;
}

#[tokio::test]
async fn sessions_do_not_share_engine_state() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());
    let (mut a, server_a, welcome_a) = connect_active(&supervisor, "/").await;
    let (mut b, server_b, welcome_b) = connect_active(&supervisor, "/").await;
    assert_ne!(welcome_a["session_id"], welcome_b["session_id"]);

    send_text(&mut a, r#"{"type":"switch_language","language":"en"}"#).await;
    assert_eq!(recv_json(&mut a).await["status"], "success");

    send_audio(&mut a, b"one").await;
    send_audio(&mut b, b"two\n").await;
    assert_eq!(recv_json(&mut a).await["text"], "one");
    let result_b = recv_json(&mut b).await;
    assert_eq!(result_b["text"], "two");
    assert_eq!(result_b["language"], "cn");

    finish(a, server_a).await;
    finish(b, server_b).await;
    assert_eq!(gw.cn.live(), 0);
    assert_eq!(gw.en.live(), 0);
}

#[tokio::test]
async fn metrics_follow_session_lifecycle() {
    let gw = MockGateway::new();
    let metrics = GatewayMetrics::new().unwrap();
    let supervisor = gw
        .supervisor(ProtocolConfig::default())
        .with_metrics(metrics.clone());
    let (mut client, server, _) = connect_active(&supervisor, "/").await;
    assert_eq!(metrics.active_sessions(), 1);

    roundtrip_ping(&mut client).await;
    send_audio(&mut client, b"x\n").await;
    recv_json(&mut client).await;

    finish(client, server).await;
    assert_eq!(metrics.active_sessions(), 0);
    let text = metrics.render().unwrap();
    assert!(text.contains(r#"asr_gateway_commands_total{command="ping",status="pong"} 1"#));
    assert!(text.contains(r#"asr_gateway_transcripts_total{kind="final"} 1"#));
}

#[tokio::test]
async fn handshake_outside_configured_path_is_refused() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default()).with_path("/asr");

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let sup = supervisor.clone();
    let server =
        tokio::spawn(async move { sup.serve_connection(server_io, None, Shutdown::never()).await });
    let refused = tokio_tungstenite::client_async("ws://localhost/other", client_io).await;
    assert!(refused.is_err());
    assert!(matches!(
        server.await.unwrap(),
        Err(ConnectionError::Handshake(_))
    ));
    assert_eq!(gw.cn.created(), 0);

    let (client, server, welcome) = connect_active(&supervisor, "/asr?language=en").await;
    assert_eq!(welcome["current_language"], "en");
    finish(client, server).await;
}

#[tokio::test]
async fn query_values_are_decoded_and_rates_bounded() {
    let gw = MockGateway::new();
    let supervisor = gw.supervisor(ProtocolConfig::default());

    let (client, server, welcome) =
        connect_active(&supervisor, "/asr?language=e%6E&sample_rate=1").await;
    assert_eq!(welcome["current_language"], "en");
    // 範囲外のレートは設定値に戻る
    assert_eq!(welcome["sample_rate"], 16_000);
    finish(client, server).await;
}
