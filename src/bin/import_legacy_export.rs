//! Imports a JSON export of the legacy document store.
//!
//! Expected shape: `{"empreendimentos": [...], "pontos_captacao": [...], "usuarios": [...]}`
//! with the legacy camelCase field names. Timestamps may be
//! `{"seconds": .., "nanoseconds": ..}` (or the underscored variants), ISO
//! strings or `dd/mm/yyyy` dates.
//!
//! Enterprises get fresh UUIDs; points are re-pointed through that mapping
//! and their derived fields are recomputed rather than trusted. Run it once
//! against an empty database: enterprises and points are not deduplicated.
//!
//! Usage: `import_legacy_export <export.json>`
use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use capture_points_api::config::Config;
use capture_points_api::db::Database;
use capture_points_api::errors::AppError;
use capture_points_api::formatting::{parse_br_date, parse_iso_date};
use capture_points_api::models::{form_input, CapturePointFields, CapturePointInput, PointStatus, UserLevel};
use capture_points_api::services::build_point_fields;
use capture_points_api::storage::CapturePointStore;
use capture_points_api::validation::{is_valid_email, require_text};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::fs;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyTimestamp {
    Seconds {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Iso(String),
}

impl LegacyTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            LegacyTimestamp::Seconds {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(*seconds, *nanoseconds),
            LegacyTimestamp::Iso(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    // Bare dates, ISO or as typed in the old forms, pinned to midday
                    parse_iso_date(raw)
                        .or_else(|_| parse_br_date(raw))
                        .ok()
                        .and_then(|date| date.and_hms_opt(12, 0, 0))
                        .map(|naive| naive.and_utc())
                }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LegacyExport {
    #[serde(default)]
    empreendimentos: Vec<LegacyEnterprise>,
    #[serde(default)]
    pontos_captacao: Vec<LegacyPoint>,
    #[serde(default)]
    usuarios: Vec<LegacyUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEnterprise {
    id: String,
    nome: String,
    #[serde(default)]
    responsavel: String,
    #[serde(default)]
    observacoes: String,
    criado_em: Option<LegacyTimestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPoint {
    #[serde(default)]
    id: String,
    nome_ponto: String,
    #[serde(default)]
    cnpj: String,
    #[serde(default)]
    endereco: String,
    empreendimento_id: String,
    #[serde(default)]
    responsavel: String,
    #[serde(default, deserialize_with = "form_input::decimal")]
    valor_real: BigDecimal,
    #[serde(default, deserialize_with = "form_input::decimal")]
    valor_fechado: BigDecimal,
    #[serde(default, deserialize_with = "form_input::decimal")]
    percentual: BigDecimal,
    #[serde(default, deserialize_with = "form_input::decimal")]
    valor_repassado: BigDecimal,
    data_inicio: LegacyTimestamp,
    #[serde(default = "default_months")]
    tempo_contrato: i32,
    #[serde(default)]
    status: String,
    criado_em: Option<LegacyTimestamp>,
}

fn default_months() -> i32 {
    capture_points_api::derivation::DEFAULT_CONTRACT_MONTHS
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyUser {
    uid: String,
    nome: String,
    email: String,
    #[serde(default)]
    nivel: String,
    #[serde(default = "default_active")]
    ativo: bool,
    criado_em: Option<LegacyTimestamp>,
}

fn default_active() -> bool {
    true
}

fn created_at(timestamp: &Option<LegacyTimestamp>) -> DateTime<Utc> {
    timestamp
        .as_ref()
        .and_then(LegacyTimestamp::to_utc)
        .unwrap_or_else(Utc::now)
}

/// Converts a legacy point, recomputing its derived fields.
///
/// `to_local_date` turns the stored instant into the calendar date users saw.
fn point_fields(
    point: &LegacyPoint,
    enterprise_id: Uuid,
    to_local_date: impl Fn(DateTime<Utc>) -> NaiveDate,
) -> Result<CapturePointFields, AppError> {
    let start = point
        .data_inicio
        .to_utc()
        .map(to_local_date)
        .ok_or_else(|| AppError::BadRequest("dataInicio is not a valid timestamp".to_string()))?;

    let status = if point.status.trim().is_empty() {
        PointStatus::Active
    } else {
        point.status.parse()?
    };

    let input = CapturePointInput {
        name: point.nome_ponto.clone(),
        tax_id: point.cnpj.clone(),
        address: point.endereco.clone(),
        enterprise_id,
        responsible: point.responsavel.clone(),
        real_value: point.valor_real.clone(),
        closed_value: point.valor_fechado.clone(),
        pass_through_percentage: point.percentual.clone(),
        start_date: start,
        contract_duration_months: point.tempo_contrato,
        status,
    };

    build_point_fields(&input)
}

async fn import_enterprises(
    pool: &PgPool,
    enterprises: &[LegacyEnterprise],
) -> Result<HashMap<String, Uuid>> {
    let mut ids = HashMap::with_capacity(enterprises.len());

    for enterprise in enterprises {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO enterprises (id, name, responsible, notes, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(enterprise.nome.trim())
        .bind(enterprise.responsavel.trim())
        .bind(enterprise.observacoes.trim())
        .bind(created_at(&enterprise.criado_em))
        .execute(pool)
        .await
        .with_context(|| format!("Failed to import enterprise {}", enterprise.id))?;

        ids.insert(enterprise.id.clone(), id);
    }

    Ok(ids)
}

/// Profile row for a legacy user, held to the same checks as the API.
struct UserRow {
    uid: String,
    name: String,
    email: String,
    level: UserLevel,
}

fn user_row(user: &LegacyUser) -> Result<UserRow, AppError> {
    let uid = require_text("uid", &user.uid)?;
    let name = require_text("name", &user.nome)?;
    let email = user.email.trim();
    if !is_valid_email(email) {
        return Err(AppError::BadRequest(format!("Invalid email: {}", email)));
    }

    Ok(UserRow {
        uid,
        name,
        email: email.to_string(),
        level: user.nivel.parse::<UserLevel>().unwrap_or_default(),
    })
}

async fn import_users(pool: &PgPool, users: &[LegacyUser]) -> (usize, usize) {
    let mut imported = 0;
    let mut failed = 0;

    for user in users {
        let row = match user_row(user) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping user {}: {}", user.uid, e);
                failed += 1;
                continue;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO user_profiles (uid, name, email, level, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (uid) DO NOTHING
            "#,
        )
        .bind(&row.uid)
        .bind(&row.name)
        .bind(&row.email)
        .bind(row.level.as_str())
        .bind(user.ativo)
        .bind(created_at(&user.criado_em))
        .execute(pool)
        .await;

        match result {
            Ok(_) => imported += 1,
            Err(e) => {
                tracing::error!("Failed to import user {}: {}", row.uid, e);
                failed += 1;
            }
        }
    }

    (imported, failed)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .context("Usage: import_legacy_export <export.json>")?;

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;

    let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
    let export: LegacyExport =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path))?;

    tracing::info!(
        "Export has {} enterprise(s), {} point(s), {} user(s)",
        export.empreendimentos.len(),
        export.pontos_captacao.len(),
        export.usuarios.len()
    );

    let enterprise_ids = import_enterprises(&db.pool, &export.empreendimentos).await?;
    tracing::info!("Imported {} enterprise(s)", enterprise_ids.len());

    let store = CapturePointStore::new(db.pool.clone());
    let mut imported = 0;
    let mut skipped = 0;
    let mut drifted = 0;

    for point in &export.pontos_captacao {
        let Some(&enterprise_id) = enterprise_ids.get(&point.empreendimento_id) else {
            tracing::warn!(
                "Skipping point {} ({}): unknown enterprise {}",
                point.id,
                point.nome_ponto,
                point.empreendimento_id
            );
            skipped += 1;
            continue;
        };

        let fields = match point_fields(point, enterprise_id, |instant| config.local_date(instant)) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!("Skipping point {} ({}): {}", point.id, point.nome_ponto, e);
                skipped += 1;
                continue;
            }
        };

        if fields.derived.pass_through_value != point.valor_repassado {
            tracing::debug!(
                "Point {} stored pass-through {} but terms give {}",
                point.id,
                point.valor_repassado,
                fields.derived.pass_through_value
            );
            drifted += 1;
        }

        match store.insert_at(&fields, created_at(&point.criado_em)).await {
            Ok(_) => imported += 1,
            Err(e) => {
                tracing::error!("Failed to import point {}: {}", point.id, e);
                skipped += 1;
            }
        }
    }

    let (users_imported, users_failed) = import_users(&db.pool, &export.usuarios).await;

    tracing::info!(
        "Import complete. Points: {} imported, {} skipped, {} with recomputed derived values. Users: {} imported, {} failed",
        imported,
        skipped,
        drifted,
        users_imported,
        users_failed
    );

    Ok(())
}
