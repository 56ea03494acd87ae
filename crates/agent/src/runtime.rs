use std::sync::Arc;

use saralytics_core::config::AppConfig;
use saralytics_core::data::TabularDataSource;
use saralytics_core::domain::conversation::ConversationTurn;
use saralytics_core::domain::specialist::{SpecialistCatalog, SpecialistId};
use saralytics_core::errors::ApplicationError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::gemini::GeminiClient;
use crate::manager::{ManagerAgent, RoutingDecision, RoutingError};
use crate::ollama::OllamaClient;
use crate::specialist::SpecialistAgent;
use crate::stream::{FragmentReceiver, StreamTransport};
use crate::tools::{ProfitAnalysisTool, ToolRegistry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Fragments come from a specialist; they may still end in an error fragment.
    Streaming,
    /// The request never reached a specialist. `fragments` holds one error.
    SetupFailed(ApplicationError),
}

pub struct ChatReply {
    pub outcome: ReplyOutcome,
    pub specialist: Option<SpecialistId>,
    pub routing: Option<RoutingDecision>,
    pub fragments: FragmentReceiver,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatRequestError {
    #[error("question must not be empty")]
    EmptyQuestion,
}

impl From<ChatRequestError> for ApplicationError {
    fn from(value: ChatRequestError) -> Self {
        Self::InvalidRequest(value.to_string())
    }
}

/// Entry points for one chat request: manager routing followed by the chosen
/// specialist, or a specialist addressed directly.
pub struct AgentRuntime {
    manager: ManagerAgent,
    specialist: SpecialistAgent,
    transport: StreamTransport,
}

impl AgentRuntime {
    pub fn new(manager: ManagerAgent, specialist: SpecialistAgent, transport: StreamTransport) -> Self {
        Self { manager, specialist, transport }
    }

    /// Wires the HTTP model clients, the built-in specialists and the profit tool
    /// over `data_source`. A missing manager key yields a disabled manager.
    pub fn from_config(config: &AppConfig, data_source: Arc<dyn TabularDataSource>) -> Self {
        let manager = match config.manager.api_key.as_ref().filter(|_| config.manager.is_enabled()) {
            Some(api_key) => ManagerAgent::new(Arc::new(GeminiClient::new(
                config.manager.base_url.clone(),
                config.manager.model.clone(),
                api_key.clone(),
                config.manager.timeout_secs,
            ))),
            None => {
                warn!(
                    event_name = "agent.manager.disabled",
                    "manager api key not configured; routed chat is disabled"
                );
                ManagerAgent::disabled()
            }
        };

        let specialist_model = Arc::new(OllamaClient::new(
            config.specialist.base_url.clone(),
            config.specialist.model.clone(),
            config.specialist.timeout_secs,
        ));
        let mut tools = ToolRegistry::default();
        tools.register(ProfitAnalysisTool::new(data_source.clone()));

        let transport = StreamTransport::default();
        let specialist = SpecialistAgent::new(
            Arc::new(SpecialistCatalog::default()),
            data_source,
            Arc::new(tools),
            specialist_model.clone(),
            specialist_model,
            transport.clone(),
        );
        Self::new(manager, specialist, transport)
    }

    pub fn manager_enabled(&self) -> bool {
        self.manager.is_enabled()
    }

    pub async fn ask(
        &self,
        question: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ChatRequestError> {
        let decision = match self.manager.route(question, history, cancel).await {
            Ok(decision) => decision,
            Err(RoutingError::EmptyQuestion) => return Err(ChatRequestError::EmptyQuestion),
            Err(failure) => {
                error!(
                    event_name = "agent.manager.failed",
                    error = %failure,
                    "manager could not route question"
                );
                let fragments = self.transport.failure(failure.user_message());
                return Ok(ChatReply {
                    outcome: ReplyOutcome::SetupFailed(failure.into()),
                    specialist: None,
                    routing: None,
                    fragments,
                });
            }
        };

        let fragments = self.specialist.handle(question, history, decision.specialist, cancel).await;
        Ok(ChatReply {
            outcome: ReplyOutcome::Streaming,
            specialist: Some(decision.specialist),
            routing: Some(decision),
            fragments,
        })
    }

    pub async fn ask_specialist(
        &self,
        question: &str,
        history: &[ConversationTurn],
        specialist: SpecialistId,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ChatRequestError> {
        if question.trim().is_empty() {
            return Err(ChatRequestError::EmptyQuestion);
        }

        let fragments = self.specialist.handle(question, history, specialist, cancel).await;
        Ok(ChatReply {
            outcome: ReplyOutcome::Streaming,
            specialist: Some(specialist),
            routing: None,
            fragments,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;
    use saralytics_core::domain::specialist::{SpecialistCatalog, SpecialistId};
    use saralytics_core::errors::ApplicationError;
    use tokio_util::sync::CancellationToken;

    use super::{AgentRuntime, ChatRequestError, ReplyOutcome};
    use crate::llm::LlmError;
    use crate::manager::{ManagerAgent, MANAGER_NOT_CONFIGURED_MESSAGE, MANAGER_UNAVAILABLE_MESSAGE};
    use crate::specialist::SpecialistAgent;
    use crate::stream::{StreamFragment, StreamTransport};
    use crate::testing::{sale, ScriptedCompletion, ScriptedStream, StaticDataSource};
    use crate::tools::{ProfitAnalysisTool, ToolRegistry, PROFIT_ANALYSIS_QUERY};

    struct Fixture {
        runtime: AgentRuntime,
        source: Arc<StaticDataSource>,
        decider: Arc<ScriptedCompletion>,
        generator: Arc<ScriptedStream>,
    }

    fn fixture(manager: ManagerAgent, decision: &str, answer: &[&str]) -> Fixture {
        let source = Arc::new(StaticDataSource::new(vec![
            sale("ItemX", "M", 2, 500.0, 100.0),
            sale("ItemX", "M", 1, 300.0, 60.0),
            sale("ItemX", "L", 1, 200.0, 40.0),
            sale("ItemY", "S", 3, 750.0, 90.0),
        ]));
        let mut tools = ToolRegistry::default();
        tools.register(ProfitAnalysisTool::new(source.clone()));
        let decider = Arc::new(ScriptedCompletion::replying(decision));
        let generator = Arc::new(ScriptedStream::fragments(answer));
        let transport = StreamTransport::default();

        let specialist = SpecialistAgent::new(
            Arc::new(SpecialistCatalog::default()),
            source.clone(),
            Arc::new(tools),
            decider.clone(),
            generator.clone(),
            transport.clone(),
        );
        Fixture { runtime: AgentRuntime::new(manager, specialist, transport), source, decider, generator }
    }

    fn routed_to(choice: &str) -> ManagerAgent {
        ManagerAgent::new(Arc::new(ScriptedCompletion::replying(choice)))
    }

    #[tokio::test]
    async fn profit_question_routes_to_finance_and_grounds_answer_in_tool_result() {
        let fixture = fixture(
            routed_to("finance"),
            r#"{"tool_name": "get_profit_analysis_for_item", "parameters": {"item_name": "ItemX"}}"#,
            &["ItemX earned ₹200.00 ", "at a 20.00% margin."],
        );

        let reply = fixture
            .runtime
            .ask("What is the total profit for ItemX?", &[], &CancellationToken::new())
            .await
            .expect("request accepted");

        assert_eq!(reply.outcome, ReplyOutcome::Streaming);
        assert_eq!(reply.specialist, Some(SpecialistId::Finance));
        let text: String = reply.fragments.map(|fragment| fragment.text).collect::<Vec<_>>().await.concat();
        assert_eq!(text, "ItemX earned ₹200.00 at a 20.00% margin.");

        let tool_calls: Vec<_> =
            fixture.source.calls().into_iter().filter(|(sql, _)| sql == PROFIT_ANALYSIS_QUERY).collect();
        assert_eq!(tool_calls.len(), 1);

        let synthesis = &fixture.generator.prompts()[0];
        assert!(synthesis.contains("\"number_of_sales\": 3"));
        assert!(synthesis.contains("\"total_revenue\": \"₹1,000.00\""));
        assert!(synthesis.contains("\"total_profit\": \"₹200.00\""));
        assert!(synthesis.contains("\"profit_margin\": \"20.00%\""));
    }

    #[tokio::test]
    async fn size_question_routes_to_inventory_and_streams_initial_prompt() {
        let fixture = fixture(routed_to("inventory"), "We sold 7 units of size M.", &["7 units", " of size M."]);

        let reply = fixture
            .runtime
            .ask("How many units of size M did we sell?", &[], &CancellationToken::new())
            .await
            .expect("request accepted");

        assert_eq!(reply.specialist, Some(SpecialistId::Inventory));
        let fragments: Vec<_> = reply.fragments.collect().await;
        assert_eq!(fragments, vec![StreamFragment::text("7 units"), StreamFragment::text(" of size M.")]);

        assert!(fixture.source.calls().iter().all(|(sql, _)| sql != PROFIT_ANALYSIS_QUERY));
        assert_eq!(fixture.generator.prompts(), vec![fixture.decider.prompts()[0].0.clone()]);
    }

    #[tokio::test]
    async fn routing_fallback_is_reported_on_the_reply() {
        let fixture = fixture(routed_to("weather"), "Sales look steady.", &["Sales look steady."]);

        let reply = fixture.runtime.ask("Anything new?", &[], &CancellationToken::new()).await.expect("accepted");

        let routing = reply.routing.expect("routing decision");
        assert!(routing.fallback_applied);
        assert_eq!(routing.specialist, SpecialistId::Sales);
    }

    #[tokio::test]
    async fn disabled_manager_fails_setup_with_one_fragment() {
        let fixture = fixture(ManagerAgent::disabled(), "unused", &["unused"]);
        assert!(!fixture.runtime.manager_enabled());

        let reply = fixture.runtime.ask("Sales?", &[], &CancellationToken::new()).await.expect("accepted");

        assert!(matches!(reply.outcome, ReplyOutcome::SetupFailed(ApplicationError::Configuration(_))));
        let fragments: Vec<_> = reply.fragments.collect().await;
        assert_eq!(fragments, vec![StreamFragment::error(MANAGER_NOT_CONFIGURED_MESSAGE)]);
        assert!(fixture.decider.prompts().is_empty());
    }

    #[tokio::test]
    async fn manager_upstream_failure_does_not_delegate() {
        let manager = ManagerAgent::new(Arc::new(ScriptedCompletion::new([Err(
            LlmError::ServiceUnavailable("403 Forbidden: API key not valid".to_string()),
        )])));
        let fixture = fixture(manager, "unused", &["unused"]);

        let reply = fixture.runtime.ask("Sales?", &[], &CancellationToken::new()).await.expect("accepted");

        assert!(matches!(reply.outcome, ReplyOutcome::SetupFailed(ApplicationError::Upstream(_))));
        let fragments: Vec<_> = reply.fragments.collect().await;
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].is_error);
        assert!(fragments[0].text.starts_with(MANAGER_UNAVAILABLE_MESSAGE));
        assert!(fragments[0].text.contains("403 Forbidden: API key not valid"), "{}", fragments[0].text);
        assert!(fixture.source.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_questions_are_rejected_on_both_entry_points() {
        let fixture = fixture(routed_to("sales"), "unused", &["unused"]);
        let cancel = CancellationToken::new();

        assert!(matches!(fixture.runtime.ask("  ", &[], &cancel).await, Err(ChatRequestError::EmptyQuestion)));
        assert!(matches!(
            fixture.runtime.ask_specialist("", &[], SpecialistId::Finance, &cancel).await,
            Err(ChatRequestError::EmptyQuestion)
        ));
    }

    #[tokio::test]
    async fn specialist_entry_point_skips_routing() {
        let fixture = fixture(ManagerAgent::disabled(), "Direct.", &["Direct."]);

        let reply = fixture
            .runtime
            .ask_specialist("Stock of ItemX?", &[], SpecialistId::Inventory, &CancellationToken::new())
            .await
            .expect("accepted");

        assert_eq!(reply.outcome, ReplyOutcome::Streaming);
        assert!(reply.routing.is_none());
        let fragments: Vec<_> = reply.fragments.collect().await;
        assert_eq!(fragments, vec![StreamFragment::text("Direct.")]);
    }
}
