//! Direct natural-language answers, no query execution.

use async_trait::async_trait;

use super::llm::{CompletionRequest, LlmClient, LlmMessage};
use super::{BackendError, ExecutionBackend, TranslateRequest, Translation};
use crate::engine::dataset::Dataset;
use crate::message::ContentType;

/// Rows of the dataset shown to the model.
const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct AnswerBackend {
    client: LlmClient,
}

impl AnswerBackend {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn preview(dataset: &Dataset) -> String {
        let head = dataset.table.head(PREVIEW_ROWS);
        let mut out = head.column_names().collect::<Vec<_>>().join(" | ");
        for idx in 0..head.row_count() {
            let cells: Vec<String> = head
                .row(idx)
                .unwrap_or_default()
                .into_iter()
                .map(|v| v.label())
                .collect();
            out.push('\n');
            out.push_str(&cells.join(" | "));
        }
        out
    }

    fn build_messages(req: &TranslateRequest<'_>) -> Vec<LlmMessage> {
        let schema = req
            .schema
            .iter()
            .map(|(name, ty)| format!("{name} ({ty})"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut system = format!(
            "You answer questions about a tabular dataset for a business user. \
             Be concise and do not show code.\nColumns: {schema}\n"
        );
        if let Some(ds) = req.dataset {
            system.push_str(&format!(
                "The dataset has {} rows. First rows:\n{}\n",
                ds.row_count(),
                Self::preview(ds)
            ));
        }

        let mut messages = vec![LlmMessage::system(system)];
        // History arrives newest first; the model wants it oldest first.
        for msg in req.history.iter().rev() {
            if msg.content_type != ContentType::Text {
                continue;
            }
            messages.push(if msg.system_generated {
                LlmMessage::assistant(msg.content.clone())
            } else {
                LlmMessage::user(msg.content.clone())
            });
        }
        messages.push(LlmMessage::user(req.prompt));
        messages
    }
}

#[async_trait]
impl ExecutionBackend for AnswerBackend {
    fn name(&self) -> &'static str {
        "answer"
    }

    async fn translate(&self, req: TranslateRequest<'_>) -> Result<Translation, BackendError> {
        let completion = CompletionRequest::new(Self::build_messages(&req)).temperature(0.2);
        let answer = self.client.complete(&completion).await?;
        Ok(Translation::Explanation(answer))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::dataset::{FileKind, Schema};
    use crate::engine::table::{Table, Value};
    use crate::message::ChatMessage;
    use crate::backend::llm::testing::mock_llm;
    use chrono::Utc;
    use uuid::Uuid;

    fn history_message(content: &str, system: bool, content_type: ContentType) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            chat_id: Uuid::nil(),
            sender_id: None,
            system_generated: system,
            artifact_version_id: None,
            content: content.into(),
            content_type,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn messages_include_preview_and_chronological_history() {
        let schema = Schema::from([("city".to_owned(), "str".to_owned())]);
        let mut table = Table::with_columns(["city"]);
        for c in ["Berlin", "Paris", "Rome", "Oslo", "Bern", "Wien"] {
            table.push_row(vec![Value::Text(c.into())]);
        }
        let dataset = Dataset { kind: FileKind::Csv, table };
        let history = vec![
            history_message("Berlin is the largest.", true, ContentType::Text),
            history_message("{}", true, ContentType::Json),
            history_message("Which city is largest?", false, ContentType::Text),
        ];

        let req = TranslateRequest {
            prompt: "And the smallest?",
            schema: &schema,
            dataset: Some(&dataset),
            history: &history,
        };
        let messages = AnswerBackend::build_messages(&req);

        assert!(messages[0].content.contains("city (str)"));
        assert!(messages[0].content.contains("6 rows"));
        assert!(messages[0].content.contains("Bern"));
        assert!(!messages[0].content.contains("Wien"));
        assert_eq!(messages[1], LlmMessage::user("Which city is largest?"));
        assert_eq!(messages[2], LlmMessage::assistant("Berlin is the largest."));
        assert_eq!(messages[3], LlmMessage::user("And the smallest?"));
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn answer_is_returned_as_explanation() {
        let (server, client) = mock_llm("Rome.").await;
        let schema = Schema::new();
        let out = AnswerBackend::new(client)
            .translate(TranslateRequest {
                prompt: "smallest?",
                schema: &schema,
                dataset: None,
                history: &[],
            })
            .await
            .unwrap();
        assert_eq!(out, Translation::Explanation("Rome.".into()));
        drop(server);
    }
}
