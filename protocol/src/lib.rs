// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # offcoin: Core Library
//!
//! Offline settlement for delivery orders. The payer holds a signed coin
//! token; the agent verifies it at the door with no signal whatsoever; the
//! server reconciles later, exactly once, no matter how many times the
//! agent's phone decides to resubmit.
//!
//! ## Architecture
//!
//! - **crypto**: Per-order secrets, HMAC-SHA256, base64url. Don't roll your own.
//! - **order**: Orders, coins, items, and creation/assignment.
//! - **token**: Minting and offline verification of coin tokens.
//! - **agent**: The handset: order cache, redemption log, device.
//! - **settlement**: Server-side batch reconciliation.
//! - **storage**: sled-backed order store.
//! - **wire**: JSON bodies for the HTTP surface.
//! - **clock**: Injected time, so tests don't have to wait four days.
//! - **config**: Protocol constants.
//!
//! ## Design Philosophy
//!
//! 1. The agent never needs the network to say yes.
//! 2. The server never says yes twice.
//! 3. Secrets are never logged. Not even at `trace`.
//! 4. If it touches money, it has tests. Plural.

pub mod agent;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod order;
pub mod settlement;
pub mod storage;
pub mod token;
pub mod wire;
