use crate::error::{ApiError, Result};
use crate::models::{
    AddMachineRequest, ConditionResponse, MachineResponse, RuleResponse, StatsParams,
    StatsResponse, UpdateRuleRequest,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use vigil_alert::MachineReport;
use vigil_core::{Machine, RuleSpec};
use vigil_series::{stats_queries, StatsGroup, StatsWindow};

/// 创建 API 路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 主机管理
        .route("/api/v1/machines", get(list_machines).post(add_machine))
        .route(
            "/api/v1/machines/:uuid",
            get(get_machine).delete(remove_machine),
        )
        .route("/api/v1/machines/:uuid/check", post(check_machine))
        .route("/api/v1/machines/:uuid/stats", get(get_stats))
        // 规则管理
        .route(
            "/api/v1/machines/:uuid/rules/:rule_id",
            put(update_rule).delete(remove_rule),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 健康检查
async fn health_check() -> &'static str {
    "OK"
}

async fn describe(state: &AppState, machine: &Machine) -> MachineResponse {
    let mut rules = Vec::with_capacity(machine.rules.len());
    for (rule_id, rule) in &machine.rules {
        let condition = state
            .store
            .get_condition(machine, rule_id)
            .await
            .ok()
            .map(ConditionResponse::from);
        rules.push(RuleResponse {
            rule_id: rule_id.clone(),
            condition_ref: rule.condition_ref.clone(),
            condition,
        });
    }
    MachineResponse::new(machine, rules)
}

/// 列出主机
async fn list_machines(State(state): State<AppState>) -> Result<Json<Vec<MachineResponse>>> {
    debug!("Listing machines");

    let machines = state.store.list_machines().await?;
    let mut data = Vec::with_capacity(machines.len());
    for machine in &machines {
        data.push(describe(&state, machine).await);
    }
    Ok(Json(data))
}

/// 获取主机
async fn get_machine(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<MachineResponse>> {
    let machine = state
        .store
        .get_machine(&uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Machine not found: {}", uuid)))?;
    Ok(Json(describe(&state, &machine).await))
}

/// 注册主机
async fn add_machine(
    State(state): State<AppState>,
    Json(req): Json<AddMachineRequest>,
) -> Result<(StatusCode, Json<MachineResponse>)> {
    let uuid = req
        .uuid
        .ok_or_else(|| ApiError::BadRequest("missing parameter 'uuid'".to_string()))?;
    let password = req.collectd_password.ok_or_else(|| {
        ApiError::BadRequest("missing parameter 'collectd_password'".to_string())
    })?;

    info!(machine = %uuid, "Adding machine");
    let machine = state.admin.add_machine(&uuid, &password).await?;

    Ok((
        StatusCode::CREATED,
        Json(MachineResponse::new(&machine, Vec::new())),
    ))
}

/// 移除主机
async fn remove_machine(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode> {
    info!(machine = %uuid, "Removing machine");
    state.admin.remove_machine(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 创建或替换规则
async fn update_rule(
    State(state): State<AppState>,
    Path((uuid, rule_id)): Path<(String, String)>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<ConditionResponse>> {
    let spec = RuleSpec::try_from(req)?;
    let condition = state.admin.update_rule(&uuid, &rule_id, spec).await?;
    Ok(Json(ConditionResponse::from(condition)))
}

/// 删除规则
async fn remove_rule(
    State(state): State<AppState>,
    Path((uuid, rule_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.admin.remove_rule(&uuid, &rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 立即求值一台主机
async fn check_machine(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<MachineReport>> {
    let report = state
        .runner
        .check_one(&uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Machine not found: {}", uuid)))?;
    Ok(Json(report))
}

/// 主机图表数据
async fn get_stats(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>> {
    if state.store.get_machine(&uuid).await?.is_none() {
        return Err(ApiError::NotFound(format!("Machine not found: {}", uuid)));
    }

    let groups = StatsGroup::parse_list(params.expression.as_deref())?;
    let window = StatsWindow::from_params(params.start, params.stop, params.step, Utc::now())?;

    debug!(
        machine = %uuid,
        groups = ?groups,
        start = window.start,
        stop = window.stop,
        step = window.step,
        "Fetching stats"
    );

    let series = state
        .series
        .fetch(&uuid, &stats_queries(&groups), &window.range()?)
        .await?;

    Ok(Json(StatsResponse {
        uuid,
        groups,
        window,
        series,
    }))
}
