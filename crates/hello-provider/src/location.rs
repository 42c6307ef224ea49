//! The `Location` kind: a point that can be moved along x.

use papiea_domain::error::Result;
use papiea_domain::model::{
    Action, DiffContent, Entity, ErrorSchema, IntentfulOutput, ProcedureDescription,
};
use papiea_sdk::{HandlerResult, IntentfulCtx, InvocationError, ProceduralCtx, ProviderSdk};
use serde_json::{json, Value};

pub const PREFIX: &str = "location_provider";
pub const VERSION: &str = "0.1.0";

pub fn kind_description() -> Value {
    json!({
        "Location": {
            "type": "object",
            "title": "X\\Y Location",
            "description": "Stores an XY location of something",
            "x-papiea-entity": "differ",
            "required": ["x", "y"],
            "properties": {
                "x": { "type": "number" },
                "y": { "type": "number" }
            }
        }
    })
}

/// Add the Location kind and its handlers to `sdk`.
pub fn install(sdk: &mut ProviderSdk) -> Result<()> {
    sdk.prefix(PREFIX)?.version(VERSION)?;
    sdk.provider_procedure(
        "ping",
        ProcedureDescription::new()
            .output(json!({ "type": "string" }))
            .describe("Liveness probe answered by the provider itself"),
        ping,
    )?;

    sdk.new_kind(&kind_description())?
        .entity_procedure(
            "moveX",
            ProcedureDescription::new()
                .input(json!({ "type": "number" }))
                .error(403, ErrorSchema {
                    description: Some("caller may not update this location".into()),
                    structure: None,
                })
                .describe("Shift the location along x"),
            move_x,
        )?
        .on("x", converge_x)?;
    Ok(())
}

async fn ping(_ctx: ProceduralCtx, _input: Value) -> HandlerResult<Value> {
    Ok(json!("pong"))
}

async fn move_x(ctx: ProceduralCtx, entity: Entity, input: Value) -> HandlerResult<Value> {
    let delta = input
        .as_f64()
        .ok_or_else(|| InvocationError::new(400, "moveX expects a number"))?;
    let entity_ref = entity.metadata.entity_ref();
    if !ctx
        .check_permission(&[(Action::Update, entity_ref.clone())], None)
        .await
    {
        return Err(InvocationError::new(403, "Permission denied"));
    }

    let mut spec = entity.spec.clone();
    let x = spec.get("x").and_then(Value::as_f64).unwrap_or(0.0);
    spec["x"] = json!(x + delta);

    let client = ctx.entity_client_for_user(&entity_ref)?;
    client.update(&entity.metadata, spec.clone()).await?;
    tracing::info!(uuid = %entity_ref.uuid, x = x + delta, "location moved");
    Ok(spec)
}

/// Pretend the move happened instantly: copy the wanted x into status.
async fn converge_x(
    ctx: IntentfulCtx,
    entity: Entity,
    diffs: Vec<DiffContent>,
) -> HandlerResult<Option<IntentfulOutput>> {
    let Some(wanted) = diffs.iter().find_map(|d| d.spec.first().cloned()) else {
        return Ok(None);
    };
    ctx.update_status(&entity.metadata.entity_ref(), &json!({ "x": wanted }))
        .await?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_registers_everything() {
        let mut sdk = ProviderSdk::builder().public_port(9005).build().unwrap();
        install(&mut sdk).unwrap();

        let doc = sdk.document().unwrap();
        let kind = doc.kind("Location").unwrap();
        assert!(kind.entity_procedures.contains_key("moveX"));
        assert_eq!(kind.intentful_signatures[0].signature, "x");
        assert!(doc.procedures.contains_key("ping"));
        assert_eq!(
            sdk.server().route_paths(),
            vec!["/Location/moveX", "/Location/x", "/ping"]
        );
    }
}
