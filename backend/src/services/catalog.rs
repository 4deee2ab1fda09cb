//! Reference data: regions, plant types, plant parts, pests and diseases

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Region {
    pub id: Uuid,
    pub name: String,
    pub state_abbreviation: String,
}

/// A named catalog entry (plant type, part, pest or disease)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Pest or disease with the plant parts it affects
#[derive(Debug, Clone, Serialize)]
pub struct HarmfulAgent {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub affected_parts: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    affected_parts: Vec<String>,
}

impl From<AgentRow> for HarmfulAgent {
    fn from(row: AgentRow) -> Self {
        Self {
            item: CatalogItem {
                id: row.id,
                name: row.name,
                description: row.description,
            },
            affected_parts: row.affected_parts,
        }
    }
}

/// Tables holding named catalog entries
#[derive(Debug, Clone, Copy)]
pub enum CatalogKind {
    PlantType,
    PlantPart,
    Pest,
    Disease,
}

impl CatalogKind {
    fn table(&self) -> &'static str {
        match self {
            CatalogKind::PlantType => "plant_types",
            CatalogKind::PlantPart => "plant_parts",
            CatalogKind::Pest => "pests",
            CatalogKind::Disease => "diseases",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CatalogKind::PlantType => "Plant type",
            CatalogKind::PlantPart => "Plant part",
            CatalogKind::Pest => "Pest",
            CatalogKind::Disease => "Disease",
        }
    }
}

impl CatalogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_regions(&self) -> AppResult<Vec<Region>> {
        let regions = sqlx::query_as::<_, Region>(
            "SELECT id, name, state_abbreviation FROM regions ORDER BY state_abbreviation, name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(regions)
    }

    pub async fn list(&self, kind: CatalogKind) -> AppResult<Vec<CatalogItem>> {
        let items = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT id, name, description FROM {} ORDER BY name",
            kind.table()
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Pests with their affected parts, optionally limited to one plant type
    pub async fn list_pests(&self, plant_type_id: Option<Uuid>) -> AppResult<Vec<HarmfulAgent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT p.id, p.name, p.description,
                   COALESCE(ARRAY_AGG(pp.name ORDER BY pp.name)
                            FILTER (WHERE pp.name IS NOT NULL), '{}') AS affected_parts
            FROM pests p
            LEFT JOIN pest_plant_parts ppp ON ppp.pest_id = p.id
            LEFT JOIN plant_parts pp ON pp.id = ppp.plant_part_id
            WHERE $1::UUID IS NULL
               OR EXISTS (SELECT 1 FROM pest_plant_types t
                          WHERE t.pest_id = p.id AND t.plant_type_id = $1)
            GROUP BY p.id
            ORDER BY p.name
            "#,
        )
        .bind(plant_type_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(HarmfulAgent::from).collect())
    }

    /// Diseases with their affected parts, optionally limited to one plant type
    pub async fn list_diseases(
        &self,
        plant_type_id: Option<Uuid>,
    ) -> AppResult<Vec<HarmfulAgent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT d.id, d.name, d.description,
                   COALESCE(ARRAY_AGG(pp.name ORDER BY pp.name)
                            FILTER (WHERE pp.name IS NOT NULL), '{}') AS affected_parts
            FROM diseases d
            LEFT JOIN disease_plant_parts dpp ON dpp.disease_id = d.id
            LEFT JOIN plant_parts pp ON pp.id = dpp.plant_part_id
            WHERE $1::UUID IS NULL
               OR EXISTS (SELECT 1 FROM disease_plant_types t
                          WHERE t.disease_id = d.id AND t.plant_type_id = $1)
            GROUP BY d.id
            ORDER BY d.name
            "#,
        )
        .bind(plant_type_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(HarmfulAgent::from).collect())
    }

    /// Entries whose names appear in `names`, in catalog order.
    ///
    /// Names with no catalog entry are skipped.
    pub async fn find_by_names(
        &self,
        kind: CatalogKind,
        names: &[String],
    ) -> AppResult<Vec<CatalogItem>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let items = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT id, name, description FROM {} WHERE name = ANY($1) ORDER BY name",
            kind.table()
        ))
        .bind(names)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Check every ID exists, reporting the first unknown one
    pub async fn ensure_exist(&self, kind: CatalogKind, ids: &[Uuid]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let found = sqlx::query_scalar::<_, Uuid>(&format!(
            "SELECT id FROM {} WHERE id = ANY($1)",
            kind.table()
        ))
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        match ids.iter().find(|id| !found.contains(id)) {
            Some(missing) => Err(AppError::Validation {
                field: kind.table().to_string(),
                message: format!("{} {} does not exist", kind.label(), missing),
            }),
            None => Ok(()),
        }
    }

    pub async fn region_exists(&self, region_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM regions WHERE id = $1)",
        )
        .bind(region_id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    pub async fn plant_type_by_name(&self, name: &str) -> AppResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM plant_types WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;

        Ok(id)
    }
}
