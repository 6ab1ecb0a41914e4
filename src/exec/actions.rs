// src/exec/actions.rs

//! Running a single attempt of an [`Action`] against the run's collaborators.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::dag::{Action, LoadAction, SqlScript, StageAction};
use crate::errors::TaskError;
use crate::external::Statement;

/// Performs one attempt of an action.
///
/// The executor calls `run` exactly once per attempt; retries, timeouts and
/// cancellation are handled around it.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &Action, ctx: &RunContext) -> Result<(), TaskError>;
}

/// Production runner: every action goes through the context's warehouse,
/// storage and credential handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarehouseActionRunner;

#[async_trait]
impl ActionRunner for WarehouseActionRunner {
    async fn run(&self, action: &Action, ctx: &RunContext) -> Result<(), TaskError> {
        match action {
            Action::NoOp => Ok(()),
            Action::ExecuteSql(script) => execute_script(script, ctx).await,
            Action::Stage(stage) => stage_objects(stage, ctx).await,
            Action::LoadFact(load) | Action::LoadDimension(load) => {
                load_table(load, ctx).await
            }
            Action::QualityCheck(check) => check.run(ctx).await,
        }
    }
}

async fn execute_script(script: &SqlScript, ctx: &RunContext) -> Result<(), TaskError> {
    for (i, sql) in script.statements.iter().enumerate() {
        let stmt = ctx.bind_sql(sql)?;
        debug!(statement = i + 1, total = script.statements.len(), "executing script statement");
        ctx.warehouse().execute(&stmt).await?;
    }
    Ok(())
}

/// Truncate the staging table, then COPY every object under the rendered
/// key prefix into it.
async fn stage_objects(stage: &StageAction, ctx: &RunContext) -> Result<(), TaskError> {
    let prefix = ctx.render(&stage.key_template)?;
    let objects = ctx.storage().list_objects(&stage.bucket, &prefix).await?;
    if objects.is_empty() {
        return Err(TaskError::ActionFailure(format!(
            "no objects found under s3://{}/{}",
            stage.bucket, prefix
        )));
    }
    debug!(table = %stage.table, objects = objects.len(), "source objects listed");

    let credentials = ctx.credentials().resolve(&stage.credential_id).await?;
    let json_path = ctx.render(&stage.json_path)?;
    let source = format!("s3://{}/{}", stage.bucket, prefix);

    if stage.truncate {
        info!(table = %stage.table, "truncating staging table");
        ctx.warehouse().execute(&Statement::truncate(&stage.table)).await?;
    }

    let copy = Statement::copy_json(&stage.table, &source, &credentials, &stage.region, &json_path);
    let rows = ctx.warehouse().execute(&copy).await?;
    info!(table = %stage.table, source = %source, rows, "staged objects");
    Ok(())
}

/// Optionally truncate, then `INSERT INTO <table> <select>`.
async fn load_table(load: &LoadAction, ctx: &RunContext) -> Result<(), TaskError> {
    let select = ctx.bind_sql(&load.select_sql)?;

    if load.truncate {
        info!(table = %load.table, "truncating table before load");
        ctx.warehouse().execute(&Statement::truncate(&load.table)).await?;
    }

    let rows = ctx
        .warehouse()
        .execute(&Statement::insert_select(&load.table, select))
        .await?;
    info!(table = %load.table, rows, "loaded table");
    Ok(())
}
