// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! FieldSync Core - Run Orchestration & Field Reconciliation Engine
//!
//! This crate synchronizes authoritative field values, extracted from source
//! documents, into a remote system of record. Each synchronization is a
//! *run*: one pass of a fixed stage pipeline over one remote entity, fully
//! recorded (stage results, audit log, progress) and pollable while it
//! executes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      External Clients                           │
//! │              (fieldsync-server HTTP API, tests)                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                │ submit / poll
//!                ▼
//! ┌──────────────────────────┐       ┌──────────────────────────────┐
//! │        handlers          │──────▶│         orchestrator         │
//! │  create / list / get /   │ spawn │  sequential stages, retry    │
//! │        health            │       │  with exponential backoff    │
//! └──────────────────────────┘       └──────────────────────────────┘
//!                │                              │
//!                │                              ▼
//!                │                   ┌──────────────────────────────┐
//!                │                   │      stage executor          │
//!                │                   │  read → reconcile → write    │
//!                │                   └──────────────────────────────┘
//!                │                       │                │
//!                ▼                       ▼                ▼
//! ┌──────────────────────────┐  ┌─────────────┐  ┌──────────────────┐
//! │        run store         │  │  reconcile  │  │  two-tier client │
//! │   (memory / sqlite)      │  │ (pure diff) │  │ (http / memory)  │
//! └──────────────────────────┘  └─────────────┘  └──────────────────┘
//! ```
//!
//! # Stage State Machine
//!
//! ```text
//!              ┌─────────┐
//!              │ pending │
//!              └────┬────┘
//!                   ▼
//!              ┌─────────┐   systemic failure,
//!       ┌──────│ running │◀─────── retry ──────┐
//!       │      └────┬────┘                     │
//!       │           │                          │
//!       ▼           ▼                          │
//! ┌─────────┐  ┌─────────┐  retries left? ─────┘
//! │ blocked │  │ failed  │       no
//! └─────────┘  └─────────┘        │
//!       ▲      ┌─────────┐        ▼
//!       │      │ success │   stage failed,
//!       └──────┴─────────┘   run halts
//! ```
//!
//! `success`, `failed` and `blocked` are terminal; the store refuses to
//! overwrite them. The run's overall status is never stored: it is derived
//! from the stage results on every query (running > failed > blocked >
//! success-if-all > pending).
//!
//! # Key Invariants
//!
//! - A run's log is append-only: never truncated, never reordered.
//! - Dry runs issue no writes to the remote system, ever.
//! - Protected fields are never overwritten automatically; a mismatch
//!   against a non-empty remote value is reported as a conflict.
//! - Stages execute strictly in pipeline order; a failed or blocked stage
//!   halts the run and leaves later stages `pending`.
//! - Field writes are idempotent set-operations, so a stage retry after a
//!   partial apply is safe.

#![deny(missing_docs)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod stage;
pub mod store;
