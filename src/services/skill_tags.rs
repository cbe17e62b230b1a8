use sqlx::PgPool;

use crate::database::models::SkillTag;
use crate::error::ServiceError;

/// Skill tags are reference data seeded by migration; the API only lists
/// them for reflection template authoring.
#[derive(Clone)]
pub struct SkillTagService {
    pool: PgPool,
}

impl SkillTagService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<SkillTag>, ServiceError> {
        Ok(
            sqlx::query_as::<_, SkillTag>("SELECT * FROM skill_tags ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}
