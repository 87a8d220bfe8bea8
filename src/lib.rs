//! # SignalDeck: Real-Time Signal Synchronization & Chart Overlay Engine
//!
//! The core of a market-signal dashboard.  It keeps every dashboard view's
//! signal list fresh, folds live price ticks into it and compiles price bars
//! plus a signal into a multi-layer chart specification.
//!
//! ```text
//!  ┌──────────────────┐  /api/signals  /api/prices   ┌───────────────────────────┐
//!  │ Analytics Backend│ ◀──────────────────────────── │ RefreshScheduler          │
//!  │                  │  /api/versions                │ ├─ {view}:signals         │
//!  │                  │ ◀──────────────────────────── │ ├─ {view}:prices          │
//!  │                  │  /api/bars                    │ FreshnessProbe ─ trigger ─┘
//!  └──────────────────┘ ◀───────── open_chart ─────── │ ViewController            │
//!                                                     │ ├─ working set (reconcile)│
//!  ┌──────────────────┐  GET /api/views/*             │ └─ compile → ChartSpec    │
//!  │  Dashboard UI    │ ◀──────────────────────────── │ AppState                  │
//!  └──────────────────┘  ws://host/ws/monitor  ◀───── │ └─ broadcast_tx           │
//!                                                     └───────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod state;
pub mod view;
