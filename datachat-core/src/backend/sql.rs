//! Prompt → SQLite query, via a short yes/no pre-check.

use async_trait::async_trait;
use tracing::debug;

use super::llm::{CompletionRequest, LlmClient, LlmMessage};
use super::{BackendError, ExecutionBackend, TranslateRequest, Translation, quoted_columns};
use crate::engine::TABLE_NAME;

const ASSISTANT_RULES: &str = "You help a business user translate a question about a dataset \
    into a SQL query. You never execute queries yourself. Every query you write must be \
    valid SQLite.";

/// Two-step translator.
///
/// 1. Ask whether the question can be answered by a query at all (one token).
/// 2. `yes` → ask for the query; `no` → ask for an explanation the user can
///    act on.  Any other first answer is passed through as text.
#[derive(Debug, Clone)]
pub struct SqlBackend {
    client: LlmClient,
}

impl SqlBackend {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn dataset_context(req: &TranslateRequest<'_>) -> String {
        let columns = quoted_columns(req.schema.keys().map(String::as_str));
        format!(
            "The table is called: {TABLE_NAME}\nThe column names of the data are: {columns}\n"
        )
    }

    async fn ask(
        &self,
        user: String,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, BackendError> {
        let mut req = CompletionRequest::new(vec![
            LlmMessage::system(ASSISTANT_RULES),
            LlmMessage::user(user),
        ]);
        req.temperature = temperature;
        req.max_tokens = max_tokens;
        self.client.complete(&req).await
    }
}

#[async_trait]
impl ExecutionBackend for SqlBackend {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn translate(&self, req: TranslateRequest<'_>) -> Result<Translation, BackendError> {
        let context = Self::dataset_context(&req);

        let verdict = self
            .ask(
                format!(
                    "Can the following question be answered with a single SQL query and no \
                     additional text?\n{}\n{context}Answer [yes/no]:",
                    req.prompt
                ),
                None,
                Some(1),
            )
            .await?;
        debug!(verdict = %verdict.trim(), "sql translatability check");

        match verdict.trim().to_lowercase().as_str() {
            "y" | "yes" => {
                let query = self
                    .ask(
                        format!(
                            "Answer the following question with a SQL query and no additional \
                             text. Use readable column aliases.\n{}\n{context}SQLite query:",
                            req.prompt
                        ),
                        Some(0.0),
                        None,
                    )
                    .await?;
                Ok(Translation::Query(query))
            }
            "n" | "no" => {
                let explanation = self
                    .ask(
                        format!(
                            "Explain to a non-technical user why the following question cannot \
                             be answered with a SQL query over this data, and suggest how to \
                             rephrase it.\n{}\n{context}Your answer:",
                            req.prompt
                        ),
                        None,
                        None,
                    )
                    .await?;
                Ok(Translation::Explanation(explanation))
            }
            _ => Ok(Translation::Explanation(verdict)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::llm::testing::{client_for, reply};
    use crate::engine::dataset::Schema;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer};

    async fn backend(server: &MockServer) -> SqlBackend {
        SqlBackend::new(client_for(server))
    }

    fn schema() -> Schema {
        Schema::from([("a".to_owned(), "int".to_owned()), ("b".to_owned(), "int".to_owned())])
    }

    fn request<'a>(prompt: &'a str, schema: &'a Schema) -> TranslateRequest<'a> {
        TranslateRequest {
            prompt,
            schema,
            dataset: None,
            history: &[],
        }
    }

    #[tokio::test]
    async fn yes_leads_to_a_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Answer [yes/no]"))
            .respond_with(reply("Yes"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("SQLite query:"))
            .respond_with(reply("```SELECT a, b FROM df```"))
            .expect(1)
            .mount(&server)
            .await;

        let schema = schema();
        let out = backend(&server).await.translate(request("show a and b", &schema)).await.unwrap();
        assert_eq!(out, Translation::Query("```SELECT a, b FROM df```".into()));
    }

    #[tokio::test]
    async fn no_leads_to_an_explanation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Answer [yes/no]"))
            .respond_with(reply("N"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Your answer:"))
            .respond_with(reply("The data has no weather column."))
            .expect(1)
            .mount(&server)
            .await;

        let schema = schema();
        let out = backend(&server).await.translate(request("will it rain?", &schema)).await.unwrap();
        assert_eq!(out, Translation::Explanation("The data has no weather column.".into()));
    }

    #[tokio::test]
    async fn unexpected_verdict_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("Maybe"))
            .expect(1)
            .mount(&server)
            .await;

        let schema = schema();
        let out = backend(&server).await.translate(request("?", &schema)).await.unwrap();
        assert_eq!(out, Translation::Explanation("Maybe".into()));
    }
}
