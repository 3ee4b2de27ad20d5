//! Test doubles shared across dispatch tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use herald_gateway::{GatewayError, GatewayReply, MessageGateway};

use super::dispatcher::Clock;

/// One recorded gateway send call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCall {
    pub phone: String,
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub caption: Option<String>,
}

/// Scripted result for one send call
pub enum SendScript {
    Ok,
    Reject(&'static str),
    RejectWithHint(&'static str, u64),
    Fail(&'static str),
}

/// Gateway double that replays a scripted sequence of send results and
/// records every call. An exhausted script answers with success.
pub struct ScriptedGateway {
    sends: Mutex<Vec<SendCall>>,
    uploads: Mutex<Vec<String>>,
    script: Mutex<VecDeque<SendScript>>,
    hosted_prefix: String,
}

impl ScriptedGateway {
    pub fn always_ok() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<SendScript>) -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            hosted_prefix: "https://media.test/".to_string(),
        }
    }

    pub fn send_calls(&self) -> Vec<SendCall> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn next_result(&self) -> Result<GatewayReply, GatewayError> {
        match self.script.lock().unwrap().pop_front() {
            None | Some(SendScript::Ok) => Ok(GatewayReply::default()),
            Some(SendScript::Reject(message)) => Err(GatewayError::Rejected {
                message: message.to_string(),
                retry_after: None,
            }),
            Some(SendScript::RejectWithHint(message, secs)) => Err(GatewayError::Rejected {
                message: message.to_string(),
                retry_after: Some(secs),
            }),
            Some(SendScript::Fail(cause)) => Err(GatewayError::Transport(cause.to_string())),
        }
    }
}

#[async_trait]
impl MessageGateway for ScriptedGateway {
    async fn send_text(&self, phone: &str, message: &str) -> Result<GatewayReply, GatewayError> {
        self.sends.lock().unwrap().push(SendCall {
            phone: phone.to_string(),
            message: Some(message.to_string()),
            media_url: None,
            caption: None,
        });
        self.next_result()
    }

    async fn send_media(
        &self,
        phone: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<GatewayReply, GatewayError> {
        self.sends.lock().unwrap().push(SendCall {
            phone: phone.to_string(),
            message: None,
            media_url: Some(media_url.to_string()),
            caption: caption.map(str::to_string),
        });
        self.next_result()
    }

    async fn upload_media(&self, payload: &str) -> Result<String, GatewayError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(payload.to_string());
        Ok(format!("https://media.test/hosted/{}", uploads.len()))
    }

    async fn check_connection(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }

    fn is_hosted_media_url(&self, url: &str) -> bool {
        url.starts_with(&self.hosted_prefix)
    }
}

/// Gateway double whose upload always fails
pub struct BrokenUploadGateway;

#[async_trait]
impl MessageGateway for BrokenUploadGateway {
    async fn send_text(&self, _phone: &str, _message: &str) -> Result<GatewayReply, GatewayError> {
        Ok(GatewayReply::default())
    }

    async fn send_media(
        &self,
        _phone: &str,
        _media_url: &str,
        _caption: Option<&str>,
    ) -> Result<GatewayReply, GatewayError> {
        Ok(GatewayReply::default())
    }

    async fn upload_media(&self, _payload: &str) -> Result<String, GatewayError> {
        Err(GatewayError::Rejected {
            message: "storage full".to_string(),
            retry_after: None,
        })
    }

    async fn check_connection(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }
}

/// Clock double that records requested waits and returns immediately
#[derive(Default)]
pub struct FakeClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
