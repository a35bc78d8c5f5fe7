// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! One-shot notices carried across a redirect in the query string. Each
//! notice is signed so a crafted link cannot put words in the app's mouth.

use anyhow::{Context, Result, anyhow};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

impl NoticeLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NoticeQuery {
    notice: String,
    level: NoticeLevel,
    sig: String,
}

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct FlashSigner {
    key: [u8; 32],
}

impl std::fmt::Debug for FlashSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashSigner").finish_non_exhaustive()
    }
}

impl FlashSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// A random key that only lives as long as this process.
    pub fn ephemeral() -> Self {
        let mut key = [0_u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if !secret.is_empty() => Self::new(secret),
            _ => Self::ephemeral(),
        }
    }

    fn mac(&self, notice: &Notice) -> Result<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|error| anyhow!("notice signing key: {error}"))?;
        mac.update(notice.level.as_str().as_bytes());
        mac.update(&[0_u8]);
        mac.update(notice.message.as_bytes());
        Ok(mac)
    }

    /// Hex HMAC-SHA256 over the level and message.
    pub fn sign(&self, notice: &Notice) -> Result<String> {
        Ok(hex::encode(self.mac(notice)?.finalize().into_bytes()))
    }

    /// `notice=..&level=..&sig=..`, ready to append after `?`.
    pub fn encode(&self, notice: &Notice) -> Result<String> {
        serde_urlencoded::to_string(NoticeQuery {
            notice: notice.message.clone(),
            level: notice.level,
            sig: self.sign(notice)?,
        })
        .context("encode notice")
    }

    /// Reads a notice back from a query string. Missing, malformed or forged
    /// notices are dropped.
    pub fn decode(&self, query: &str) -> Option<Notice> {
        let parsed: NoticeQuery = serde_urlencoded::from_str(query).ok()?;
        let sig = hex::decode(&parsed.sig).ok()?;
        let notice = Notice {
            level: parsed.level,
            message: parsed.notice,
        };
        self.mac(&notice).ok()?.verify_slice(&sig).ok()?;
        Some(notice)
    }

    pub fn redirect_target(&self, path: &str, notice: &Notice) -> Result<String> {
        Ok(format!("{path}?{}", self.encode(notice)?))
    }
}
