// HTTP backend for Sigil Chat: config, logging, state and route handlers.

pub mod web;
