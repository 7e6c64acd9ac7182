// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (admin authentication, response headers).

pub mod basic_auth;
pub mod security;

pub use basic_auth::require_basic_auth;
