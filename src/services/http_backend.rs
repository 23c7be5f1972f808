use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::config::Settings;
use crate::schemas::answer::AnswerRecord;
use crate::schemas::contest::ContestParticipation;
use crate::schemas::submission::{ActiveSubmission, CreatedSubmission, FinalizedSubmission};
use crate::services::remote::{BackendError, ContestBackend, SubmissionBackend};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubmissionBody<'a> {
    exam_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignment_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contest_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushAnswersBody<'a> {
    answers: &'a [AnswerRecord],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    answers: &'a [AnswerRecord],
    time_spent_seconds: u64,
}

/// JSON/HTTP client for the submission and contest endpoints.
#[derive(Debug, Clone)]
pub struct HttpExamBackend {
    client: Client,
    base_url: Option<Url>,
    token: Option<String>,
}

impl HttpExamBackend {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let remote = settings.remote();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(remote.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, &remote.base_url, &remote.token))
    }

    pub fn with_client(client: Client, base_url: &str, token: &str) -> Self {
        let token = Some(token.trim().to_string()).filter(|token| !token.is_empty());
        let base_url = Some(base_url.trim()).filter(|raw| !raw.is_empty()).and_then(|raw| {
            match Url::parse(raw) {
                Ok(url) if !url.cannot_be_a_base() => Some(url),
                _ => {
                    tracing::warn!(base_url = raw, "Ignoring invalid exam API base URL");
                    None
                }
            }
        });
        Self { client, base_url, token }
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone().ok_or(BackendError::NotConfigured)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::NotConfigured)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        self.authorized(request)
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))
    }

    async fn expect_success(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status { status: status.as_u16(), body })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let response = Self::expect_success(response).await?;
        response.json::<T>().await.map_err(|err| BackendError::Decode(err.to_string()))
    }
}

#[async_trait]
impl SubmissionBackend for HttpExamBackend {
    async fn create_submission(
        &self,
        exam_id: &str,
        assignment_id: Option<&str>,
        contest_id: Option<&str>,
    ) -> Result<CreatedSubmission, BackendError> {
        let url = self.url(&["submissions"])?;
        let body = CreateSubmissionBody { exam_id, assignment_id, contest_id };
        let response = self.send(self.client.post(url).json(&body)).await?;
        Self::decode(response).await
    }

    async fn push_answers(
        &self,
        submission_id: &str,
        answers: &[AnswerRecord],
    ) -> Result<(), BackendError> {
        let url = self.url(&["submissions", submission_id, "answers"])?;
        let response = self.send(self.client.put(url).json(&PushAnswersBody { answers })).await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn submit_exam(
        &self,
        submission_id: &str,
        answers: &[AnswerRecord],
        time_spent_seconds: u64,
    ) -> Result<FinalizedSubmission, BackendError> {
        let url = self.url(&["submissions", submission_id, "submit"])?;
        let body = SubmitBody { answers, time_spent_seconds };
        let response = self.send(self.client.post(url).json(&body)).await?;
        Self::decode(response).await
    }

    async fn get_active_submission(
        &self,
        exam_id: &str,
    ) -> Result<Option<ActiveSubmission>, BackendError> {
        let url = self.url(&["exams", exam_id, "active-submission"])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }
}

#[async_trait]
impl ContestBackend for HttpExamBackend {
    async fn get_contest_participation(
        &self,
        contest_id: &str,
    ) -> Result<ContestParticipation, BackendError> {
        let url = self.url(&["contests", contest_id, "participation"])?;
        let response = self.send(self.client.get(url)).await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_without_double_slashes() {
        let backend =
            HttpExamBackend::with_client(Client::new(), "https://api.example.test/v1/", " ");
        assert_eq!(
            backend.url(&["submissions", "s-1", "answers"]).unwrap().as_str(),
            "https://api.example.test/v1/submissions/s-1/answers"
        );
        assert!(backend.token.is_none());
    }

    #[test]
    fn ids_are_percent_encoded_as_single_segments() {
        let backend = HttpExamBackend::with_client(Client::new(), "https://api.example.test", "");
        assert_eq!(
            backend.url(&["exams", "a/b c?", "active-submission"]).unwrap().as_str(),
            "https://api.example.test/exams/a%2Fb%20c%3F/active-submission"
        );
    }

    #[test]
    fn invalid_base_url_is_not_configured() {
        let backend = HttpExamBackend::with_client(Client::new(), "not a url", "");
        assert!(matches!(backend.url(&["submissions"]), Err(BackendError::NotConfigured)));
    }

    #[tokio::test]
    async fn empty_base_url_is_not_configured() {
        let backend = HttpExamBackend::with_client(Client::new(), "", "token");
        let err = backend.get_active_submission("exam-1").await.unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured));
        let err = backend.get_contest_participation("c-1").await.unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured));
    }

    #[test]
    fn submit_body_uses_camel_case() {
        let body = SubmitBody { answers: &[], time_spent_seconds: 42 };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"answers": [], "timeSpentSeconds": 42}));
    }
}
