//! # Customs KB
//!
//! A hybrid search knowledge base for US customs regulatory notices and
//! HTSUS tariff codes.
//!
//! Customs KB ingests Federal Register documents and the Harmonized Tariff
//! Schedule, chunks and embeds document text, and answers three kinds of
//! queries: pure semantic search over document text, structured lookups by
//! document number, tariff code, or publication date, and hybrid queries
//! that combine a structured filter with semantic ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Federal Register │──▶│   Pipeline    │──▶│    SQLite     │
//! │ HTSUS schedule   │   │ Chunk+Embed  │   │ rows + points │
//! └──────────────────┘   └──────────────┘   └──────┬────────┘
//!                                                  │
//!                              ┌───────────────────┤
//!                              ▼                   ▼
//!                         ┌──────────┐       ┌──────────┐
//!                         │   CLI    │       │   HTTP   │
//!                         │  (ckb)   │       │  (axum)  │
//!                         └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ckb init                                 # create database
//! ckb ingest htsus                         # load the tariff schedule
//! ckb ingest federal-register              # load regulatory notices
//! ckb search "cheese import duties"        # semantic search
//! ckb serve                                # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`text`] | HTML stripping, normalization, chunking, code extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Filtered vector similarity index |
//! | [`hierarchy`] | Tariff-code parent inference |
//! | [`store`] | Relational store queries |
//! | [`retrieval`] | Semantic, structured, and hybrid search |
//! | [`federal_register`] | Federal Register API client |
//! | [`htsus`] | HTSUS schedule download and transform |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod federal_register;
pub mod hierarchy;
pub mod htsus;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod status;
pub mod store;
pub mod text;
pub mod vector;
