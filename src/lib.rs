// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Agent Library
 * Adaptive security-reconnaissance engine: a bounded Reason -> Act ->
 * Observe loop over an allowlisted web target
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

pub mod config;
pub mod errors;
pub mod state;

// Probing infrastructure
pub mod frontier;
pub mod http_client;
pub mod probe;

// Reasoning node (LLM boundary lives entirely inside this module)
pub mod cortex;

// Deterministic post-processing
pub mod findings;
pub mod report;

// Loop control
pub mod engine;
pub mod router;
