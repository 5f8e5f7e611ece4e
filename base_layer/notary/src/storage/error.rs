// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

use crate::storage::database::DbKey;

#[derive(Debug, Error)]
pub enum ContextStorageError {
    #[error("Value not found: {0}")]
    ValueNotFound(DbKey),
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
