use serde_json::json;

use super::*;

#[derive(Default)]
struct ScriptedTransport {
    started: Vec<CompletionRequest>,
    senders: Vec<StreamSender>,
    /// Events sent synchronously from `start`
    script: Vec<String>,
    fail_start: Option<TransportError>,
    offline: bool,
}

impl ScriptedTransport {
    fn with_script(script: &[&str]) -> Self {
        Self {
            script: script.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn sender(&self, n: usize) -> &StreamSender {
        &self.senders[n]
    }
}

impl CompletionTransport for ScriptedTransport {
    fn start(
        &mut self,
        request: CompletionRequest,
        sender: StreamSender,
    ) -> Result<(), TransportError> {
        self.started.push(request);
        if let Some(err) = self.fail_start.clone() {
            return Err(err);
        }
        for event in &self.script {
            sender.frame(event.clone());
        }
        self.senders.push(sender);
        Ok(())
    }

    fn test_connection(&mut self, config: &AiConfig) -> Result<String, TransportError> {
        if self.offline {
            return Err(TransportError::new("HTTP 503"));
        }
        Ok(format!("{} API available", config.provider))
    }

    fn list_models(&mut self, config: &AiConfig) -> Result<Vec<String>, TransportError> {
        if self.offline {
            return Err(TransportError::new("HTTP 503"));
        }
        Ok(model_ids(
            config.provider,
            &json!({ "data": [{ "id": "gpt-4o" }, { "id": "gpt-4o-mini" }] }),
        ))
    }
}

fn openai_frame(content: &str) -> String {
    format!(
        "data: {}",
        json!({ "choices": [{ "delta": { "content": content } }] })
    )
}

fn keyed_config() -> AiConfig {
    AiConfig {
        provider: Provider::OpenAi,
        api_key: "sk-test".to_string(),
        ..AiConfig::default()
    }
}

fn create_aggregator() -> StreamAggregator<ScriptedTransport> {
    StreamAggregator::new(ScriptedTransport::default(), StreamConfig::default())
}

#[test]
fn test_hello_world_stream_completes() {
    let mut ai = create_aggregator();
    ai.invoke("greet", &keyed_config(), 0).unwrap();
    assert!(ai.view().loading);

    let tx = ai.transport().sender(0).clone();
    tx.frame(openai_frame("Hello"));
    tx.frame(openai_frame(" World"));
    ai.poll(10);
    assert!(ai.view().loading, "loading until the terminal marker");

    tx.frame("data: [DONE]");
    assert!(ai.poll(20));

    let view = ai.view();
    assert_eq!(view.result_text, "Hello World");
    assert!(!view.loading);
    assert_eq!(view.elapsed_ms, 20);
}

#[test]
fn test_pieces_are_coalesced_until_flush_delay() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();

    tx.frame(openai_frame("a"));
    assert!(!ai.poll(0));
    assert_eq!(ai.next_deadline(), Some(60));
    tx.frame(openai_frame("b"));
    assert!(!ai.poll(30));
    tx.frame(openai_frame("c"));
    assert!(!ai.poll(59));
    assert_eq!(ai.result_text(), "");
    assert_eq!(ai.pending_text(), "abc");

    assert!(ai.poll(60));
    assert_eq!(ai.result_text(), "abc");
    assert_eq!(ai.next_deadline(), None);

    // The next piece arms a fresh timer
    tx.frame(openai_frame("d"));
    ai.poll(100);
    assert_eq!(ai.next_deadline(), Some(160));
}

#[test]
fn test_terminal_marker_flushes_trailing_text_immediately() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();

    tx.frame(openai_frame("tail"));
    tx.frame("data: [DONE]");
    ai.poll(1);

    assert_eq!(ai.result_text(), "tail");
    assert!(!ai.is_loading());
    assert_eq!(ai.next_deadline(), None);
}

#[test]
fn test_skipped_frames_do_not_disturb_stream() {
    let mut ai = StreamAggregator::new(
        ScriptedTransport::with_script(&[
            "event: message_start",
            "data: {\"type\":\"ping\"}",
            "data: {broken",
            "data: {\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}",
            "data: [DONE]",
        ]),
        StreamConfig::default(),
    );
    ai.invoke("p", &keyed_config(), 0).unwrap();
    ai.poll(0);
    assert_eq!(ai.result_text(), "ok");
    assert!(!ai.is_loading());
}

#[test]
fn test_missing_credential_never_reaches_transport() {
    let mut ai = create_aggregator();
    let config = AiConfig {
        provider: Provider::OpenAi,
        api_key: String::new(),
        ..AiConfig::default()
    };

    let result = ai.invoke("p", &config, 0);

    assert_eq!(
        result,
        Err(AiError::MissingCredential {
            provider: Provider::OpenAi
        })
    );
    assert!(ai.transport().started.is_empty());
    assert!(!ai.is_loading());
    assert_eq!(ai.session_id(), None);
}

#[test]
fn test_missing_credential_leaves_running_session_alone() {
    let mut ai = create_aggregator();
    ai.invoke("first", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();

    let _ = ai.invoke("second", &AiConfig::default(), 10);

    assert!(tx.frame(openai_frame("still here")));
    tx.frame("data: [DONE]");
    ai.poll(20);
    assert_eq!(ai.result_text(), "still here");
}

#[test]
fn test_ollama_needs_no_key() {
    let mut ai = create_aggregator();
    ai.invoke("p", &AiConfig::for_provider(Provider::Ollama), 0)
        .unwrap();
    assert_eq!(ai.transport().started.len(), 1);
}

#[test]
fn test_new_invoke_detaches_previous_stream() {
    let mut ai = create_aggregator();
    ai.invoke("A", &keyed_config(), 0).unwrap();
    let tx_a = ai.transport().sender(0).clone();
    tx_a.frame(openai_frame("from A"));

    ai.invoke("B", &keyed_config(), 10).unwrap();
    let tx_b = ai.transport().sender(1).clone();
    assert_ne!(tx_a.session(), tx_b.session());

    // A's transport keeps delivering after B started
    assert!(!tx_a.frame(openai_frame("late A")));
    assert!(!tx_a.frame("data: [DONE]"));
    tx_b.frame(openai_frame("from B"));
    ai.poll(100);

    assert_eq!(ai.result_text(), "from B");
    assert!(ai.is_loading(), "A's terminal marker must not end B");
}

#[test]
fn test_abort_stops_display_updates() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();
    tx.frame(openai_frame("kept"));
    ai.poll(5);

    assert!(ai.abort(10));
    assert!(!ai.is_loading());
    assert!(ai.is_aborted());
    assert_eq!(ai.result_text(), "kept", "received text is flushed on abort");

    assert!(!tx.frame(openai_frame(" dropped")));
    tx.fail(TransportError::new("connection reset"));
    assert!(!ai.poll(1000));
    assert_eq!(ai.result_text(), "kept");
    assert!(!ai.abort(1000));
}

#[test]
fn test_start_failure_becomes_result_text() {
    let mut ai = StreamAggregator::new(
        ScriptedTransport {
            fail_start: Some(TransportError::new("AI API error: 401 Unauthorized")),
            ..ScriptedTransport::default()
        },
        StreamConfig::default(),
    );

    assert!(ai.invoke("p", &keyed_config(), 0).is_ok());

    assert!(!ai.is_loading());
    assert_eq!(ai.result_text(), "Error: AI API error: 401 Unauthorized");
}

#[test]
fn test_failure_after_partial_output_keeps_output() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();
    tx.frame(openai_frame("partial"));
    tx.fail(TransportError::new("stream reset"));

    assert!(ai.poll(5));

    assert_eq!(ai.result_text(), "partial");
    assert!(!ai.is_loading());
}

#[test]
fn test_close_without_marker_finishes_session() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();
    tx.frame(openai_frame("body"));
    tx.close();

    ai.poll(40);

    assert_eq!(ai.result_text(), "body");
    assert!(!ai.is_loading());
    assert_eq!(ai.view().elapsed_ms, 40);
}

#[test]
fn test_dropped_transport_finishes_session() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    ai.transport_mut().senders.clear();

    assert!(ai.poll(1));
    assert!(!ai.is_loading());
}

#[test]
fn test_frames_after_done_are_ignored() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();
    tx.frame(openai_frame("done"));
    tx.frame("data: [DONE]");
    tx.frame(openai_frame(" extra"));
    ai.poll(10);

    assert_eq!(ai.result_text(), "done");
    assert!(!tx.frame(openai_frame(" more")));
}

#[test]
fn test_no_timeout_by_default() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    assert!(!ai.poll(10_000_000));
    assert!(ai.is_loading());
    assert_eq!(ai.next_deadline(), None);
}

#[test]
fn test_timeout_synthesises_transport_error() {
    let mut ai = StreamAggregator::new(
        ScriptedTransport::default(),
        StreamConfig {
            timeout_ms: Some(1000),
            ..StreamConfig::default()
        },
    );
    ai.invoke("p", &keyed_config(), 500).unwrap();
    assert_eq!(ai.next_deadline(), Some(1500));
    assert!(!ai.poll(1499));

    assert!(ai.poll(1500));

    assert!(!ai.is_loading());
    assert_eq!(ai.result_text(), "Error: request timed out after 1000 ms");
    assert!(!ai.transport().sender(0).frame(openai_frame("late")));
}

#[test]
fn test_regenerate_replays_last_prompt() {
    let mut ai = create_aggregator();
    assert_eq!(ai.regenerate(0), Ok(false));

    let mut config = keyed_config();
    config.model = "gpt-4o".to_string();
    ai.invoke("write a haiku", &config, 0).unwrap();
    let tx = ai.transport().sender(0).clone();
    tx.frame(openai_frame("first try"));
    tx.frame("data: [DONE]");
    ai.poll(10);

    assert_eq!(ai.regenerate(20), Ok(true));

    let started = &ai.transport().started;
    assert_eq!(started.len(), 2);
    assert_eq!(started[1].prompt, "write a haiku");
    assert_eq!(started[1].model.as_deref(), Some("gpt-4o"));
    assert_eq!(ai.result_text(), "");
    assert!(ai.is_loading());
    assert_eq!(ai.last_prompt(), Some("write a haiku"));
}

#[test]
fn test_close_detaches_and_stops_loading() {
    let mut ai = create_aggregator();
    ai.invoke("p", &keyed_config(), 0).unwrap();
    let tx = ai.transport().sender(0).clone();
    ai.close();
    assert!(!ai.is_loading());
    assert!(!tx.frame(openai_frame("x")));
    assert_eq!(ai.session_id(), None);
}

#[test]
fn test_request_carries_config() {
    let mut ai = create_aggregator();
    let config = AiConfig {
        provider: Provider::Claude,
        api_key: " key ".to_string(),
        system_prompt: "terse".to_string(),
        temperature: 0.2,
        ..AiConfig::default()
    };
    ai.invoke("hello", &config, 0).unwrap();
    let request = &ai.transport().started[0];
    assert_eq!(request.provider, Provider::Claude);
    assert_eq!(request.api_key, "key");
    assert_eq!(request.system_prompt.as_deref(), Some("terse"));
    assert_eq!(request.temperature, Some(0.2));
}

#[test]
fn test_connection_and_models_delegate_to_transport() {
    let mut ai = create_aggregator();
    assert_eq!(
        ai.test_connection(&keyed_config()).unwrap(),
        "OpenAI API available"
    );
    assert_eq!(
        ai.list_models(&keyed_config()).unwrap(),
        vec!["gpt-4o", "gpt-4o-mini"]
    );

    ai.transport_mut().offline = true;
    assert_eq!(
        ai.test_connection(&keyed_config()),
        Err(AiError::Transport(TransportError::new("HTTP 503")))
    );
    assert!(ai.list_models(&keyed_config()).is_err());
}

#[test]
fn test_prompt_from_action_flows_into_request() {
    let mut ai = create_aggregator();
    let source = SourceText {
        selection: "teh text",
        document: "",
    };
    let prompt = build_prompt(AiAction::Rewrite, Scope::Selection, &source).unwrap();
    ai.invoke(prompt, &keyed_config(), 0).unwrap();
    assert!(ai.transport().started[0].prompt.contains("teh text"));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn visible_text_is_arrival_order_concatenation(
            pieces in prop::collection::vec("[a-zA-Z0-9 ]{1,6}", 1..30),
            gaps in prop::collection::vec(0u64..120, 30),
            flush_delay in 0u64..200,
        ) {
            let mut ai = StreamAggregator::new(
                ScriptedTransport::default(),
                StreamConfig { flush_delay_ms: flush_delay, timeout_ms: None },
            );
            ai.invoke("p", &keyed_config(), 0).unwrap();
            let tx = ai.transport().sender(0).clone();

            let mut now = 0;
            let mut sent = String::new();
            for (piece, gap) in pieces.iter().zip(&gaps) {
                now += gap;
                tx.frame(openai_frame(piece));
                sent.push_str(piece);
                ai.poll(now);
                // Whatever is visible is always a prefix of what was sent
                prop_assert!(sent.starts_with(ai.result_text()));
                prop_assert!(ai.is_loading());
            }
            tx.frame("data: [DONE]");
            ai.poll(now);

            prop_assert_eq!(ai.result_text(), sent.as_str());
            prop_assert!(!ai.is_loading());
        }
    }
}
