// ===============================
// src/lib.rs
// ===============================
/*
=============================================================================
Project : fxcolt - IPC bridge between a sandboxed trading host and a backend
Module  : lib.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Adapter side publishes ticks/symbols/orders over per-account,
          per-kind pipes and takes commands; backend side discovers the
          pipes, keeps them connected, routes REPL/strategy commands back,
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
pub mod consts;
pub mod domain;
pub mod order;
pub mod naming;
pub mod wire;
pub mod note;
pub mod command;
pub mod parser;
pub mod ipc;
pub mod shutdown;
pub mod config;
pub mod metrics;
pub mod recorder;

// sisi adapter (host)
pub mod transmitter;
pub mod adapter;

// sisi backend
pub mod accounts;
pub mod discovery;
pub mod connection;
pub mod communicator;
pub mod console;
pub mod strategy;
pub mod trader;
pub mod executor;
pub mod backend;
