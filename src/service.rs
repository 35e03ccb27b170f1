//! Transport collaborator seam: registered operations and decode hooks
//!
//! The actual listener, connection handling, and request dispatch live
//! outside this crate. This module only fixes the contract the transport
//! consumes: a named operation runs fetch-and-attach inline when called
//! locally, and fetch-then-encode when served remotely; the receiving
//! side rebuilds the graph through a pluggable decode hook.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::codec::{Decoded, Envelope, GraphCodec, GraphValue};
use crate::context::ExecutionContext;
use crate::error::{GraphError, GraphResult};
use crate::ops::Loaded;

type Handler =
    Arc<dyn Fn(ExecutionContext, Value) -> BoxFuture<'static, GraphResult<Loaded>> + Send + Sync>;

/// Hook invoked on received envelopes; defaults to [`GraphCodec::decode`]
pub type DecodeHook = Arc<dyn Fn(&Envelope) -> GraphResult<Decoded> + Send + Sync>;

/// Registry of operations a transport can serve
pub struct ServiceRegistry {
    handlers: DashMap<String, Handler>,
    decode_hook: DecodeHook,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            decode_hook: Arc::new(|envelope: &Envelope| GraphCodec::decode(envelope)),
        }
    }

    /// Replace the decode hook applied to received envelopes
    pub fn with_decode_hook(mut self, hook: DecodeHook) -> Self {
        self.decode_hook = hook;
        self
    }

    /// Register a named operation
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(ExecutionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GraphResult<Loaded>> + Send + 'static,
    {
        self.handlers.insert(
            name.to_string(),
            Arc::new(move |cx, args| Box::pin(handler(cx, args))),
        );
    }

    /// Whether an operation name is registered
    pub fn has_operation(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    async fn invoke(
        &self,
        name: &str,
        cx: ExecutionContext,
        args: Value,
    ) -> GraphResult<Loaded> {
        let handler = self
            .handlers
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                GraphError::Transport(format!("operation '{}' not registered", name))
            })?;
        handler(cx, args).await
    }

    /// Local call path: the linked graph is returned inline
    pub async fn call_local(
        &self,
        name: &str,
        cx: ExecutionContext,
        args: Value,
    ) -> GraphResult<GraphValue> {
        Ok(self.invoke(name, cx, args).await?.value)
    }

    /// Remote serving path: fetch, then encode the graph for the wire
    pub async fn call_remote(
        &self,
        name: &str,
        cx: ExecutionContext,
        args: Value,
    ) -> GraphResult<Envelope> {
        let loaded = self.invoke(name, cx, args).await?;
        GraphCodec::encode(&loaded.value, &loaded.identity)
    }

    /// Receiving side: rebuild the graph from an envelope
    pub fn receive(&self, envelope: &Envelope) -> GraphResult<Decoded> {
        (self.decode_hook)(envelope)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
