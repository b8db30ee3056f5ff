#![doc = "bookref-core: core pipeline library for bookref."]

//! Locates each infrastructure project's Book of Reference, downloads it and
//! derives a category 3 postcode count from its pages.
//!
//! # Usage
//! Build a [`config::PipelineConfig`], load entities with [`catalog`], then
//! call [`pipeline::run`] with an [`http::HttpFetcher`] (or any
//! [`contract::Fetcher`]).

pub mod catalog;
pub mod classify;
pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod http;
pub mod pdf_text;
pub mod pipeline;
pub mod resolve;
