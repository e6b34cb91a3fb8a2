// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed calls for the education backend: subjects, profiles, studies,
//! comments, and their storage uploads.

use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::{ApiClient, ApiResponse, BatchReport, ItemOutcome, Operation, REST_PREFIX};
use crate::credential::claims;
use crate::error::ApiError;

pub const PROFILE_IMAGES_BUCKET: &str = "profile-images";
pub const STUDY_FILES_BUCKET: &str = "study-files";

static UNSAFE_FILE_CHARS: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]"));

/// Ordering of study listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StudySort {
    #[default]
    Hot,
    New,
    Top,
}

impl StudySort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
        }
    }
}

/// A vote on a study or comment. `Clear` withdraws a previous vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum VoteType {
    #[serde(rename = "upvote")]
    Upvote,
    #[serde(rename = "downvote")]
    Downvote,
    #[serde(rename = "none")]
    Clear,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
            Self::Clear => "none",
        }
    }

    /// The vote a tap on `pressed` produces given the user's current vote:
    /// pressing the active direction again clears it.
    pub fn toggle(current: Option<VoteType>, pressed: VoteType) -> VoteType {
        if current == Some(pressed) {
            VoteType::Clear
        } else {
            pressed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowState {
    pub is_following: bool,
    #[serde(default)]
    pub followers_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(default)]
    pub upvotes_count: i64,
    #[serde(default)]
    pub downvotes_count: i64,
    #[serde(default)]
    pub user_vote: Option<VoteType>,
}

impl VoteTally {
    pub fn score(&self) -> i64 {
        self.upvotes_count - self.downvotes_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub is_saved: bool,
}

/// `{success, message, ...}` envelope several backend functions answer with.
#[derive(Debug, Deserialize)]
struct RpcOutcome<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    data: Option<T>,
}

fn default_success() -> bool {
    true
}

/// A study to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudy {
    pub title: String,
    pub content: String,
    pub subject_id: String,
    pub description: Option<String>,
    pub status: String,
    pub study_type: String,
    /// Already-uploaded files to attach.
    pub file_urls: Vec<String>,
}

impl NewStudy {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            subject_id: subject_id.into(),
            description: None,
            status: "public".to_owned(),
            study_type: "other".to_owned(),
            file_urls: Vec::new(),
        }
    }
}

/// A created study row plus the outcome of attaching each file.
#[derive(Debug)]
pub struct CreatedStudy {
    pub study: Value,
    pub attachments: BatchReport,
}

/// Education backend calls over an [`ApiClient`].
#[derive(Clone)]
pub struct EducationClient {
    api: ApiClient,
    subject_endpoints: Vec<String>,
}

impl EducationClient {
    pub fn new(api: ApiClient, subject_endpoints: Vec<String>) -> Self {
        Self { api, subject_endpoints }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // -- Accounts -----------------------------------------------------------

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Value, ApiError> {
        self.api.sign_up(email, password, name).await
    }

    pub async fn change_password(&self, new_password: &str) -> Result<(), ApiError> {
        let op =
            Operation::new(Method::PUT, "auth/v1/user").json(json!({ "password": new_password }));
        self.api.execute(&op).await?;
        info!("password changed");
        Ok(())
    }

    // -- Subjects -----------------------------------------------------------

    /// List subjects, walking the configured endpoints until one answers.
    pub async fn subjects(&self) -> Result<Value, ApiError> {
        let candidates: Vec<_> = self
            .subject_endpoints
            .iter()
            .map(|endpoint| {
                Operation::get(format!("{REST_PREFIX}/{endpoint}")).query("select", "*")
            })
            .collect();
        self.api.execute_with_fallback(&candidates).await?.json()
    }

    pub async fn toggle_subject_follow(&self, subject_id: &str) -> Result<FollowState, ApiError> {
        self.rpc_outcome("toggle_subject_follow", json!({ "subject_uuid": subject_id })).await
    }

    // -- Profile ------------------------------------------------------------

    pub async fn user_profile(&self) -> Result<Value, ApiError> {
        self.rpc("get_user_profile", json!({})).await
    }

    pub async fn update_user_profile(
        &self,
        name: &str,
        bio: &str,
        profile_image_url: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut args = json!({ "user_name": name, "user_bio": bio });
        if let Some(url) = profile_image_url {
            args["profile_image_url"] = json!(url);
        }
        self.rpc("update_user_profile", args).await
    }

    /// Upload a JPEG avatar and return its public URL.
    pub async fn upload_profile_image(&self, data: impl Into<Bytes>) -> Result<String, ApiError> {
        let name = format!("profile_{}.jpg", crate::epoch_ms());
        let op = Operation::upload(PROFILE_IMAGES_BUCKET, &name, "image/jpeg", data, true)
            .header("cache-control", "3600");
        self.api.execute(&op).await?;
        Ok(self.api.backend().public_object_url(PROFILE_IMAGES_BUCKET, &name)?.to_string())
    }

    // -- Studies ------------------------------------------------------------

    /// Upload a study attachment under a unique, sanitised name and return
    /// its public URL.
    pub async fn upload_study_file(
        &self,
        data: impl Into<Bytes>,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, ApiError> {
        let data = data.into();
        if data.is_empty() {
            return Err(ApiError::Invalid("file is empty".to_owned()));
        }
        let name = format!("{}_{}", crate::epoch_ms(), sanitize_file_name(file_name)?);
        debug!(file = %name, bytes = data.len(), "uploading study file");
        let op = Operation::upload(STUDY_FILES_BUCKET, &name, content_type, data, false);
        self.api.execute(&op).await?;
        Ok(self.api.backend().public_object_url(STUDY_FILES_BUCKET, &name)?.to_string())
    }

    /// Insert a study, then attach its files. Attachment failures are
    /// reported in [`CreatedStudy::attachments`], not returned as errors.
    pub async fn create_study(&self, study: NewStudy) -> Result<CreatedStudy, ApiError> {
        let token = self.api.ensure_valid().await?;
        let user_id = claims::subject(token.as_str())
            .ok_or_else(|| ApiError::Invalid("access token carries no user id".to_owned()))?;

        let mut row = json!({
            "title": study.title,
            "content": study.content,
            "subject_id": study.subject_id,
            "author_id": user_id,
            "status": study.status,
            "study_type": study.study_type,
        });
        if let Some(description) = &study.description {
            row["description"] = json!(description);
        }
        let op = Operation::post_json(format!("{REST_PREFIX}/studies"), row)
            .header("prefer", "return=representation");
        let created: Value = self.api.execute(&op).await?.json()?;
        let created = match created {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            other => other,
        };
        let study_id = created.get("id").and_then(id_string);
        info!(
            study_id = study_id.as_deref().unwrap_or("?"),
            files = study.file_urls.len(),
            "study created"
        );

        let attachments = match study_id {
            Some(id) => self.attach_files(&id, &user_id, &study.file_urls).await,
            None => BatchReport {
                items: study
                    .file_urls
                    .iter()
                    .map(|url| ItemOutcome {
                        label: file_name_of(url).to_owned(),
                        result: Err(ApiError::Invalid("created study has no id".to_owned())),
                    })
                    .collect(),
            },
        };
        Ok(CreatedStudy { study: created, attachments })
    }

    async fn attach_files(
        &self,
        study_id: &str,
        user_id: &str,
        file_urls: &[String],
    ) -> BatchReport {
        let items = file_urls.iter().map(|url| {
            let file_name = file_name_of(url);
            let row = json!({
                "study_id": study_id,
                "file_url": url,
                "file_name": file_name,
                "uploaded_by": user_id,
            });
            (file_name.to_owned(), Operation::post_json(format!("{REST_PREFIX}/study_files"), row))
        });
        self.api.execute_batch(items).await
    }

    pub async fn studies_by_subject(
        &self,
        subject_id: &str,
        sort: StudySort,
    ) -> Result<Value, ApiError> {
        self.rpc(
            "get_studies_by_subject",
            json!({ "subject_uuid": subject_id, "sort_by": sort.as_str() }),
        )
        .await
    }

    pub async fn my_studies(&self, sort: StudySort) -> Result<Value, ApiError> {
        self.rpc("get_my_studies", json!({ "sort_by": sort.as_str() })).await
    }

    /// Studies of a subject (hot first by default) or, without a subject,
    /// the caller's own studies (newest first by default).
    pub async fn studies(
        &self,
        subject_id: Option<&str>,
        sort: Option<StudySort>,
    ) -> Result<Value, ApiError> {
        match subject_id {
            Some(id) => self.studies_by_subject(id, sort.unwrap_or(StudySort::Hot)).await,
            None => self.my_studies(sort.unwrap_or(StudySort::New)).await,
        }
    }

    pub async fn vote_study(&self, study_id: &str, vote: VoteType) -> Result<VoteTally, ApiError> {
        let args = json!({ "study_uuid": study_id, "vote_type": vote.as_str() });
        self.rpc_outcome("vote_study", args).await
    }

    pub async fn toggle_study_save(&self, study_id: &str) -> Result<SaveState, ApiError> {
        self.rpc_outcome("toggle_study_save", json!({ "study_uuid": study_id })).await
    }

    // -- Comments -----------------------------------------------------------

    pub async fn study_comments(&self, study_id: &str) -> Result<Value, ApiError> {
        self.rpc("get_study_comments", json!({ "study_uuid": study_id })).await
    }

    pub async fn post_comment(&self, study_id: &str, content: &str) -> Result<Value, ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::Invalid("comment is empty".to_owned()));
        }
        self.rpc("post_comment", json!({ "study_uuid": study_id, "comment_content": content }))
            .await
    }

    pub async fn vote_comment(
        &self,
        comment_id: &str,
        vote: VoteType,
    ) -> Result<VoteTally, ApiError> {
        self.rpc_outcome(
            "vote_comment",
            json!({ "comment_uuid": comment_id, "vote_type_param": vote.as_str() }),
        )
        .await
    }

    // -- Plumbing -----------------------------------------------------------

    async fn rpc(&self, name: &str, args: Value) -> Result<Value, ApiError> {
        self.api.execute(&Operation::rpc(name, args)).await?.json()
    }

    /// Call a function answering `{success, message, ...fields}`. A
    /// `success: false` reply becomes a remote error.
    async fn rpc_outcome<T: DeserializeOwned>(
        &self,
        name: &str,
        args: Value,
    ) -> Result<T, ApiError> {
        let resp = self.api.execute(&Operation::rpc(name, args)).await?;
        decode_outcome(name, &resp)
    }
}

fn decode_outcome<T: DeserializeOwned>(name: &str, resp: &ApiResponse) -> Result<T, ApiError> {
    let outcome: RpcOutcome<T> = resp.json()?;
    if !outcome.success {
        return Err(ApiError::Remote {
            status: resp.status,
            message: outcome.message.unwrap_or_else(|| format!("{name} was rejected")),
        });
    }
    outcome
        .data
        .ok_or_else(|| ApiError::Invalid(format!("{name} returned an incomplete response")))
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> Result<String, ApiError> {
    let re = UNSAFE_FILE_CHARS
        .as_ref()
        .map_err(|e| ApiError::Invalid(format!("file name pattern: {e}")))?;
    Ok(re.replace_all(name, "_").into_owned())
}

fn file_name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "education_tests.rs"]
mod tests;
