// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod completion;
pub mod credentials;
pub mod generator;

pub use completion::{CompletionClient, CompletionError, GeminiClient};
pub use credentials::{CredentialError, CredentialService, TokenKind, TokenPair};
pub use generator::{FieldGenerator, GeneratedFields, GenerationError, GenerationRequest};
