//! `papiea-sdk`: write papiea providers in Rust.
//!
//! A [`ProviderSdk`] assembles the provider document (kinds, procedures,
//! intent handlers), registers it with the engine and serves the callbacks
//! the engine then sends. Handlers receive a [`ProceduralCtx`] carrying
//! the provider identity and the invoking user's credentials.
//!
//! ```rust,no_run
//! use papiea_sdk::{HandlerResult, ProceduralCtx, ProviderSdk};
//! use papiea_domain::model::{Entity, ProcedureDescription};
//! use serde_json::{json, Value};
//!
//! async fn move_x(ctx: ProceduralCtx, entity: Entity, input: Value) -> HandlerResult<Value> {
//!     let client = ctx.entity_client_for_user(&entity.metadata.entity_ref())?;
//!     let mut spec = entity.spec.clone();
//!     spec["x"] = json!(spec["x"].as_i64().unwrap_or(0) + input.as_i64().unwrap_or(0));
//!     client.update(&entity.metadata, spec).await?;
//!     Ok(json!({}))
//! }
//!
//! # async fn example() -> papiea_domain::error::Result<()> {
//! let mut sdk = ProviderSdk::builder()
//!     .engine_url("http://127.0.0.1:3333")
//!     .s2s_key("admin-key")
//!     .public_port(9005)
//!     .build()?;
//! sdk.prefix("location_provider")?.version("0.1.0")?;
//! sdk.new_kind(&json!({ "Location": { "type": "object", "x-papiea-entity": "differ" } }))?
//!     .entity_procedure("moveX", ProcedureDescription::new(), move_x)?;
//! sdk.register().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod handler;
pub mod kind_builder;
pub mod sdk;
pub mod security;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────

pub use builder::ProviderSdkBuilder;
pub use context::{IntentfulCtx, ProceduralCtx};
pub use handler::{
    EntityProcedureHandler, HandlerResult, IntentHandler, InvocationError, ProcedureHandler,
};
pub use kind_builder::KindBuilder;
pub use sdk::ProviderSdk;
pub use security::SecurityApi;
pub use server::CallbackServer;
