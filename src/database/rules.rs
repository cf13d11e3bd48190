use crate::models::*;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn ruleset_from_row(row: &SqliteRow) -> Result<RuleSet> {
    Ok(RuleSet {
        id: row.try_get::<String, _>("id")?.parse()?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_default: row.try_get("is_default")?,
        enabled: row.try_get("enabled")?,
        priority: row.try_get("priority")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn tag_rule_from_row(row: &SqliteRow) -> Result<TagRule> {
    Ok(TagRule {
        id: row.try_get::<String, _>("id")?.parse()?,
        ruleset_id: row.try_get::<String, _>("ruleset_id")?.parse()?,
        name: row.try_get("name")?,
        pattern: row.try_get("pattern")?,
        pattern_kind: row.try_get("pattern_kind")?,
        tag_name: row.try_get("tag_name")?,
        source: row.try_get("source")?,
        remove_from_name: row.try_get("remove_from_name")?,
        replacement: row.try_get("replacement")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl super::Database {
    pub async fn create_ruleset(
        &self,
        name: &str,
        description: Option<&str>,
        is_default: bool,
        priority: i32,
    ) -> Result<RuleSet> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO rulesets (id, name, description, is_default, enabled, priority, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(description)
        .bind(is_default)
        .bind(priority)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_ruleset(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created ruleset"))
    }

    pub async fn get_ruleset(&self, id: Uuid) -> Result<Option<RuleSet>> {
        let row = sqlx::query("SELECT * FROM rulesets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ruleset_from_row).transpose()
    }

    pub async fn get_ruleset_by_name(&self, name: &str) -> Result<Option<RuleSet>> {
        let row = sqlx::query("SELECT * FROM rulesets WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ruleset_from_row).transpose()
    }

    pub async fn list_rulesets(&self) -> Result<Vec<RuleSet>> {
        let rows = sqlx::query("SELECT * FROM rulesets ORDER BY priority, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ruleset_from_row).collect()
    }

    pub async fn delete_ruleset(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rulesets WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_tag_rule(&self, request: &TagRuleCreateRequest) -> Result<TagRule> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO tag_rules (id, ruleset_id, name, pattern, pattern_kind, tag_name, source,
                remove_from_name, replacement, priority, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(request.ruleset_id.to_string())
        .bind(&request.name)
        .bind(&request.pattern)
        .bind(request.pattern_kind)
        .bind(&request.tag_name)
        .bind(request.source)
        .bind(request.remove_from_name)
        .bind(&request.replacement)
        .bind(request.priority)
        .bind(request.enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM tag_rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        tag_rule_from_row(&row)
    }

    pub async fn list_tag_rules(&self, ruleset_id: Uuid) -> Result<Vec<TagRule>> {
        let rows = sqlx::query(
            "SELECT * FROM tag_rules WHERE ruleset_id = ? AND enabled = 1 ORDER BY priority",
        )
        .bind(ruleset_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(tag_rule_from_row).collect()
    }

    pub async fn delete_tag_rule(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tag_rules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn assign_ruleset(
        &self,
        account_id: Uuid,
        ruleset_id: Uuid,
        priority: i32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO account_rulesets (id, account_id, ruleset_id, priority, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id.to_string())
        .bind(ruleset_id.to_string())
        .bind(priority)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unassign_ruleset(&self, account_id: Uuid, ruleset_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM account_rulesets WHERE account_id = ? AND ruleset_id = ?",
        )
        .bind(account_id.to_string())
        .bind(ruleset_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rules applying to an account: explicitly assigned rulesets in
    /// assignment-priority order, else all default rulesets; within each
    /// ruleset, rules in priority order.
    pub async fn rules_for_account(&self, account_id: Uuid) -> Result<Vec<TagRule>> {
        let assigned = sqlx::query(
            "SELECT rs.id FROM rulesets rs
             JOIN account_rulesets ars ON ars.ruleset_id = rs.id
             WHERE ars.account_id = ? AND rs.enabled = 1
             ORDER BY ars.priority, rs.priority",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let ruleset_ids: Vec<Uuid> = if assigned.is_empty() {
            let defaults = sqlx::query(
                "SELECT id FROM rulesets WHERE is_default = 1 AND enabled = 1 ORDER BY priority",
            )
            .fetch_all(&self.pool)
            .await?;
            defaults
                .iter()
                .map(|row| Ok(row.try_get::<String, _>("id")?.parse()?))
                .collect::<Result<Vec<_>>>()?
        } else {
            assigned
                .iter()
                .map(|row| Ok(row.try_get::<String, _>("id")?.parse()?))
                .collect::<Result<Vec<_>>>()?
        };

        let mut rules = Vec::new();
        for ruleset_id in ruleset_ids {
            rules.extend(self.list_tag_rules(ruleset_id).await?);
        }
        Ok(rules)
    }

    /// Export a ruleset and its rules as a versioned JSON document.
    pub async fn export_ruleset(&self, ruleset_id: Uuid) -> Result<RuleSetDocument> {
        let ruleset = self
            .get_ruleset(ruleset_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Ruleset {} not found", ruleset_id))?;
        let rules = self.list_tag_rules(ruleset_id).await?;

        Ok(RuleSetDocument {
            version: 1,
            kind: "tag_ruleset".to_string(),
            ruleset: RuleSetExport {
                name: ruleset.name,
                description: ruleset.description,
                rules: rules
                    .into_iter()
                    .map(|r| TagRuleExport {
                        name: r.name,
                        pattern: r.pattern,
                        pattern_kind: r.pattern_kind,
                        tag_name: r.tag_name,
                        source: r.source,
                        remove_from_name: r.remove_from_name,
                        replacement: r.replacement,
                        priority: r.priority,
                    })
                    .collect(),
            },
        })
    }

    /// Import a ruleset document as a new ruleset, preserving rule order and
    /// fields. The name may be overridden to avoid unique collisions.
    pub async fn import_ruleset(
        &self,
        document: &RuleSetDocument,
        name_override: Option<&str>,
    ) -> Result<RuleSet> {
        if document.kind != "tag_ruleset" {
            anyhow::bail!("Unsupported document kind: {}", document.kind);
        }
        if document.version != 1 {
            anyhow::bail!("Unsupported document version: {}", document.version);
        }

        let name = name_override.unwrap_or(&document.ruleset.name);
        let ruleset = self
            .create_ruleset(name, document.ruleset.description.as_deref(), false, 100)
            .await?;

        for rule in &document.ruleset.rules {
            self.create_tag_rule(&TagRuleCreateRequest {
                ruleset_id: ruleset.id,
                name: rule.name.clone(),
                pattern: rule.pattern.clone(),
                pattern_kind: rule.pattern_kind,
                tag_name: rule.tag_name.clone(),
                source: rule.source,
                remove_from_name: rule.remove_from_name,
                replacement: rule.replacement.clone(),
                priority: rule.priority,
                enabled: true,
            })
            .await?;
        }

        Ok(ruleset)
    }
}
