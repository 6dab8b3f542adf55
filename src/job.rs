//! Job models: what a submitter asks for and what the worker answers.

use crate::error::JobError;
use crate::queue::QueueMessage;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Message attribute naming the requested conversion.
pub const ATTR_ACTION: &str = "action";
/// Message attribute carrying the source PDF URL.
pub const ATTR_FILE_URL: &str = "file_url";
/// Message attribute used to correlate requests and responses.
pub const ATTR_TASK_ID: &str = "task_id";

/// Prefix under which all converted artifacts are stored.
const OUTPUT_PREFIX: &str = "output/";

/// Requested conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ToImage,
    ToHtml,
    ToText,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ToImage => "ToImage",
            Action::ToHtml => "ToHTML",
            Action::ToText => "ToText",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ToImage" => Ok(Action::ToImage),
            "ToHTML" => Ok(Action::ToHtml),
            "ToText" => Ok(Action::ToText),
            other => Err(JobError::UnsupportedAction(other.to_string())),
        }
    }
}

/// A decoded conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub action: Action,
    pub source_url: String,
    pub task_id: String,
}

impl Job {
    pub fn new(action: Action, source_url: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            action,
            source_url: source_url.into(),
            task_id: task_id.into(),
        }
    }

    /// Decodes a job from the attributes of an inbound message.
    ///
    /// Fails on a missing attribute or an action token outside
    /// `ToImage`/`ToHTML`/`ToText`.
    pub fn from_message(message: &QueueMessage) -> Result<Self, JobError> {
        let attr = |name: &'static str| {
            message
                .attribute(name)
                .ok_or(JobError::MissingAttribute(name))
        };

        let action = attr(ATTR_ACTION)?.parse()?;
        let source_url = attr(ATTR_FILE_URL)?.to_string();
        let task_id = attr(ATTR_TASK_ID)?.to_string();

        Ok(Self {
            action,
            source_url,
            task_id,
        })
    }

    /// Last path segment of the source URL.
    pub fn source_basename(&self) -> &str {
        basename(&self.source_url)
    }

    /// Name of the converted artifact, `{action}-{basename}`.
    pub fn output_name(&self) -> String {
        format!("{}-{}", self.action, self.source_basename())
    }

    /// Storage key for this job's artifact, made unique with a fresh UUID.
    pub fn object_key(&self) -> String {
        format!("{}{}{}", OUTPUT_PREFIX, Uuid::new_v4(), self.output_name())
    }
}

/// Outcome of one job, consumed immediately to build the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub success: bool,
    pub output_url: String,
    pub error_detail: String,
}

impl JobResult {
    pub fn success(output_url: impl Into<String>) -> Self {
        Self {
            success: true,
            output_url: output_url.into(),
            error_detail: String::new(),
        }
    }

    pub fn failure(error_detail: impl Into<String>) -> Self {
        Self {
            success: false,
            output_url: String::new(),
            error_detail: error_detail.into(),
        }
    }
}

/// Response sent to the output queue for every received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub body: String,
    pub task_id: Option<String>,
}

impl Notification {
    /// Notification for a job that was decoded and processed.
    pub fn for_result(job: &Job, result: &JobResult) -> Self {
        let tail = if result.success {
            &result.output_url
        } else {
            &result.error_detail
        };

        Self {
            body: format_body(job.action.as_str(), &job.source_url, tail),
            task_id: Some(job.task_id.clone()),
        }
    }

    /// Notification for a message that could not be decoded into a job.
    ///
    /// Echoes whatever raw attributes were present so the submitter can still
    /// correlate the failure.
    pub fn for_rejected(message: &QueueMessage, error: &JobError) -> Self {
        let action = message.attribute(ATTR_ACTION).unwrap_or_default();
        let file_url = message.attribute(ATTR_FILE_URL).unwrap_or_default();

        Self {
            body: format_body(action, file_url, &error.to_string()),
            task_id: message.attribute(ATTR_TASK_ID).map(str::to_string),
        }
    }

    /// Wire message for the output queue.
    pub fn into_message(self) -> QueueMessage {
        let message = QueueMessage::new(self.body);
        match self.task_id {
            Some(task_id) => message.with_attribute(ATTR_TASK_ID, task_id),
            None => message,
        }
    }
}

fn format_body(action: &str, input: &str, tail: &str) -> String {
    format!("{}:{}\t{}\n", action, input, tail)
}

fn basename(url: &str) -> &str {
    match url.rfind('/') {
        Some(idx) => &url[idx + 1..],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inbound(action: &str, file_url: &str, task_id: &str) -> QueueMessage {
        QueueMessage::new("")
            .with_attribute(ATTR_ACTION, action)
            .with_attribute(ATTR_FILE_URL, file_url)
            .with_attribute(ATTR_TASK_ID, task_id)
    }

    #[test]
    fn test_action_tokens() {
        for action in [Action::ToImage, Action::ToHtml, Action::ToText] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!(Action::ToHtml.to_string(), "ToHTML");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = "ToPng".parse::<Action>().unwrap_err();
        assert!(matches!(err, JobError::UnsupportedAction(ref a) if a == "ToPng"));

        // Tokens are case sensitive
        assert!("totext".parse::<Action>().is_err());
        assert!("ToHtml".parse::<Action>().is_err());
    }

    #[test]
    fn test_decode_job() {
        let job = Job::from_message(&inbound("ToText", "http://x/doc.pdf", "T1")).unwrap();

        assert_eq!(job, Job::new(Action::ToText, "http://x/doc.pdf", "T1"));
    }

    #[test]
    fn test_decode_missing_attribute() {
        let message = QueueMessage::new("")
            .with_attribute(ATTR_ACTION, "ToText")
            .with_attribute(ATTR_TASK_ID, "T1");

        let err = Job::from_message(&message).unwrap_err();
        assert!(matches!(err, JobError::MissingAttribute("file_url")));
    }

    #[test]
    fn test_output_naming() {
        let job = Job::new(Action::ToImage, "https://host/a/b/report.pdf", "T1");
        assert_eq!(job.source_basename(), "report.pdf");
        assert_eq!(job.output_name(), "ToImage-report.pdf");

        let key = job.object_key();
        assert!(key.starts_with("output/"));
        assert!(key.ends_with("ToImage-report.pdf"));
        // "output/" + 36-char uuid + name
        assert_eq!(key.len(), 7 + 36 + "ToImage-report.pdf".len());
        assert_ne!(key, job.object_key());
    }

    #[test]
    fn test_basename_without_slash() {
        let job = Job::new(Action::ToText, "doc.pdf", "T1");
        assert_eq!(job.output_name(), "ToText-doc.pdf");

        let job = Job::new(Action::ToText, "http://host/dir/", "T1");
        assert_eq!(job.output_name(), "ToText-");
    }

    #[test]
    fn test_success_notification() {
        let job = Job::new(Action::ToText, "http://x/doc.pdf", "T1");
        let note = Notification::for_result(&job, &JobResult::success("https://b/out.txt"));

        assert_eq!(note.body, "ToText:http://x/doc.pdf\thttps://b/out.txt\n");
        assert_eq!(note.task_id.as_deref(), Some("T1"));
    }

    #[test]
    fn test_failure_notification() {
        let job = Job::new(Action::ToImage, "http://x/doc.pdf", "T2");
        let note = Notification::for_result(&job, &JobResult::failure("boom"));

        assert_eq!(note.body, "ToImage:http://x/doc.pdf\tboom\n");

        let message = note.into_message();
        assert_eq!(message.attribute(ATTR_TASK_ID), Some("T2"));
    }

    #[test]
    fn test_rejected_notification() {
        let message = inbound("ToPng", "http://x/doc.pdf", "T3");
        let err = Job::from_message(&message).unwrap_err();
        let note = Notification::for_rejected(&message, &err);

        assert_eq!(
            note.body,
            "ToPng:http://x/doc.pdf\tunsupported action 'ToPng'\n"
        );
        assert_eq!(note.task_id.as_deref(), Some("T3"));
    }

    #[test]
    fn test_rejected_without_task_id() {
        let message = QueueMessage::new("").with_attribute(ATTR_ACTION, "ToText");
        let err = Job::from_message(&message).unwrap_err();
        let note = Notification::for_rejected(&message, &err);

        assert_eq!(note.task_id, None);
        assert!(note.into_message().attribute(ATTR_TASK_ID).is_none());
    }

    #[test]
    fn test_job_result_constructors() {
        let ok = JobResult::success("url");
        assert!(ok.success);
        assert!(ok.error_detail.is_empty());

        let failed = JobResult::failure("err");
        assert!(!failed.success);
        assert!(failed.output_url.is_empty());
    }
}
