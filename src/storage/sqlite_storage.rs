// SQLite report store: reports, their ordered trait grades and cached RVs
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::fitrep::codes::{OccasionCode, Rank, TraitGrade};
use crate::fitrep::labels::TRAIT_NAMES;
use crate::fitrep::report::{ExtractedReport, ExtractionStatus, OfficerIdentity, TraitScore};
use crate::scoring::cohort::{CohortKey, CohortMember, CohortScores};
use crate::scoring::fra::{compute_fra, Fra};
use crate::scoring::relative_value::RvAnchors;
use crate::types::{FitrepError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reporting-senior identity as SQL, matching `OfficerIdentity::identity`.
const RS_IDENTITY: &str = "COALESCE(rs_edipi, UPPER(TRIM(rs_last_name)))";

pub struct ReportStore {
    conn: Connection,
}

/// RV and anchors as of the last recompute of the report's cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedRv {
    pub rv: Option<u8>,
    pub anchors: Option<RvAnchors>,
    pub computed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReport {
    pub id: i64,
    pub source_path: Option<String>,
    pub created_at: String,
    pub report: ExtractedReport,
    pub relative_value: Option<CachedRv>,
}

/// One line of a cohort listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortEntry {
    pub id: i64,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub occasion: Option<OccasionCode>,
    pub period_to: Option<NaiveDate>,
    pub fra: Option<Fra>,
    pub not_observed: bool,
    pub rv: Option<u8>,
}

impl CohortEntry {
    pub fn member(&self) -> CohortMember<i64> {
        CohortMember {
            id: self.id,
            fra: self.fra,
            occasion: self.occasion,
            not_observed: self.not_observed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub report_count: usize,
    pub cohort_count: usize,
    pub with_fra: usize,
    pub with_rv: usize,
}

impl ReportStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!("opened report store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY,
                source_path TEXT,
                fitrep_id TEXT,
                last_name TEXT,
                first_name TEXT,
                edipi TEXT,
                rank TEXT,
                occasion TEXT,
                period_from TEXT,
                period_to TEXT,
                organization TEXT,
                rs_last_name TEXT,
                rs_rank TEXT,
                rs_edipi TEXT,
                ro_last_name TEXT,
                ro_rank TEXT,
                ro_edipi TEXT,
                not_observed INTEGER NOT NULL DEFAULT 0,
                fra_hundredths INTEGER,
                status TEXT NOT NULL,
                pages_json TEXT NOT NULL DEFAULT '[]',
                issues_json TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            -- Ordered grades; NULL is a trait that was not read
            CREATE TABLE IF NOT EXISTS trait_grades (
                report_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                trait_name TEXT NOT NULL,
                grade TEXT,
                PRIMARY KEY (report_id, position),
                FOREIGN KEY (report_id) REFERENCES reports(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS relative_values (
                report_id INTEGER PRIMARY KEY,
                rv INTEGER,
                max_fra INTEGER,
                mean_fra INTEGER,
                floor_fra INTEGER,
                cohort_size INTEGER,
                computed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (report_id) REFERENCES reports(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_reports_cohort
                ON reports(rank, rs_edipi, rs_last_name);
            "#,
        )?;
        Ok(())
    }

    /// Persist one extracted report with its grades. Returns the new id.
    pub fn insert_report(&self, report: &ExtractedReport, source: Option<&Path>) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"INSERT INTO reports (
                   source_path, fitrep_id, last_name, first_name, edipi, rank, occasion,
                   period_from, period_to, organization,
                   rs_last_name, rs_rank, rs_edipi, ro_last_name, ro_rank, ro_edipi,
                   not_observed, fra_hundredths, status, pages_json, issues_json)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, ?18, ?19, ?20, ?21)"#,
            params![
                source.map(|p| p.to_string_lossy().into_owned()),
                report.fitrep_id,
                report.last_name,
                report.first_name,
                report.edipi,
                report.rank.map(Rank::code),
                report.occasion.map(OccasionCode::code),
                report.period_from.map(format_date),
                report.period_to.map(format_date),
                report.organization,
                report.reporting_senior.last_name,
                report.reporting_senior.rank.map(Rank::code),
                report.reporting_senior.edipi,
                report.reviewing_officer.last_name,
                report.reviewing_officer.rank.map(Rank::code),
                report.reviewing_officer.edipi,
                report.not_observed,
                report.fra.map(Fra::hundredths),
                status_code(report.status),
                serde_json::to_string(&report.pages)?,
                serde_json::to_string(&report.issues)?,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_traits(&tx, id, &report.traits)?;
        tx.commit()?;

        debug!("stored report {} ({:?})", id, report.fitrep_id);
        Ok(id)
    }

    pub fn get_report(&self, id: i64) -> Result<StoredReport> {
        let raw = self
            .conn
            .query_row(
                r#"SELECT r.id, r.source_path, r.fitrep_id, r.last_name, r.first_name, r.edipi,
                          r.rank, r.occasion, r.period_from, r.period_to, r.organization,
                          r.rs_last_name, r.rs_rank, r.rs_edipi, r.ro_last_name, r.ro_rank, r.ro_edipi,
                          r.not_observed, r.fra_hundredths, r.status, r.pages_json, r.issues_json,
                          r.created_at,
                          v.report_id, v.rv, v.max_fra, v.mean_fra, v.floor_fra, v.cohort_size,
                          v.computed_at
                   FROM reports r
                   LEFT JOIN relative_values v ON v.report_id = r.id
                   WHERE r.id = ?1"#,
                params![id],
                RawReport::from_row,
            )
            .optional()?
            .ok_or(FitrepError::ReportNotFound(id))?;

        let traits = self.read_traits(id)?;
        raw.into_stored(traits)
    }

    fn read_traits(&self, id: i64) -> Result<Vec<TraitScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT trait_name, grade FROM trait_grades WHERE report_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let name: String = row.get(0)?;
            let grade: Option<String> = row.get(1)?;
            Ok(TraitScore {
                name,
                grade: grade.as_deref().and_then(TraitGrade::from_letter),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Every stored report of one cohort with its cached RV, read as one snapshot.
    pub fn cohort_entries(&self, key: &CohortKey) -> Result<Vec<CohortEntry>> {
        let tx = self.conn.unchecked_transaction()?;
        let entries = {
            let sql = format!(
                r#"SELECT r.id, r.last_name, r.first_name, r.occasion, r.period_to,
                          r.fra_hundredths, r.not_observed, v.rv
                   FROM reports r
                   LEFT JOIN relative_values v ON v.report_id = r.id
                   WHERE r.rank = ?1 AND {} = ?2
                   ORDER BY r.id"#,
                RS_IDENTITY
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params![key.rank.code(), key.reporting_senior], |row| {
                let occasion: Option<String> = row.get(3)?;
                let period_to: Option<String> = row.get(4)?;
                let fra: Option<i64> = row.get(5)?;
                let rv: Option<i64> = row.get(7)?;
                Ok(CohortEntry {
                    id: row.get(0)?,
                    last_name: row.get(1)?,
                    first_name: row.get(2)?,
                    occasion: occasion.as_deref().and_then(OccasionCode::from_code),
                    period_to: period_to.as_deref().and_then(parse_date),
                    fra: fra.map(Fra::from_hundredths),
                    not_observed: row.get(6)?,
                    rv: rv.and_then(|v| u8::try_from(v).ok()),
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        Ok(entries)
    }

    pub fn cohort_members(&self, key: &CohortKey) -> Result<Vec<CohortMember<i64>>> {
        Ok(self.cohort_entries(key)?.iter().map(CohortEntry::member).collect())
    }

    /// Distinct cohort keys over all reports that have one.
    pub fn cohort_keys(&self) -> Result<Vec<CohortKey>> {
        let sql = format!(
            r#"SELECT DISTINCT rank, {identity}
               FROM reports
               WHERE rank IS NOT NULL AND {identity} IS NOT NULL AND {identity} <> ''"#,
            identity = RS_IDENTITY
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut keys = Vec::new();
        for row in rows {
            let (rank, senior) = row?;
            if let Some(rank) = Rank::from_code(&rank) {
                keys.push(CohortKey::new(rank, senior));
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub fn cohort_key_of(&self, id: i64) -> Result<Option<CohortKey>> {
        Ok(CohortKey::for_report(&self.get_report(id)?.report))
    }

    /// Replace the ordered grades of a report and recompute its FRA.
    /// `grades` must hold one entry per trait, in form order.
    pub fn update_trait_grades(&self, id: i64, grades: &[Option<TraitGrade>]) -> Result<Option<Fra>> {
        if grades.len() != TRAIT_NAMES.len() {
            return Err(FitrepError::InvalidGrades(format!(
                "expected {} grades, got {}",
                TRAIT_NAMES.len(),
                grades.len()
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        let exists: Option<i64> = tx
            .query_row("SELECT id FROM reports WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(FitrepError::ReportNotFound(id));
        }

        let traits: Vec<TraitScore> = TRAIT_NAMES
            .iter()
            .zip(grades)
            .map(|(name, grade)| TraitScore {
                name: name.to_string(),
                grade: *grade,
            })
            .collect();
        let fra = compute_fra(grades.iter().flatten().copied());

        tx.execute("DELETE FROM trait_grades WHERE report_id = ?1", params![id])?;
        write_traits(&tx, id, &traits)?;
        tx.execute(
            "UPDATE reports SET fra_hundredths = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![fra.map(Fra::hundredths), id],
        )?;
        tx.commit()?;

        debug!("regraded report {}: FRA {:?}", id, fra);
        Ok(fra)
    }

    /// Cache the RVs of the scored members. Excluded members keep whatever
    /// was cached before.
    pub fn store_relative_values(&self, scores: &CohortScores<i64>) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO relative_values
                       (report_id, rv, max_fra, mean_fra, floor_fra, cohort_size, computed_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
                   ON CONFLICT(report_id) DO UPDATE SET
                       rv = excluded.rv,
                       max_fra = excluded.max_fra,
                       mean_fra = excluded.mean_fra,
                       floor_fra = excluded.floor_fra,
                       cohort_size = excluded.cohort_size,
                       computed_at = CURRENT_TIMESTAMP"#,
            )?;
            let anchors = scores.anchors;
            for member in &scores.scored {
                stmt.execute(params![
                    member.id,
                    member.rv.map(i64::from),
                    anchors.map(|a| a.max_fra.hundredths()),
                    anchors.map(|a| a.mean_fra.hundredths()),
                    anchors.map(|a| a.floor_fra.hundredths()),
                    anchors.map(|a| a.cohort_size as i64),
                ])?;
            }
        }
        tx.commit()?;
        Ok(scores.scored.len())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            report_count: count("SELECT COUNT(*) FROM reports")?,
            cohort_count: self.cohort_keys()?.len(),
            with_fra: count("SELECT COUNT(*) FROM reports WHERE fra_hundredths IS NOT NULL")?,
            with_rv: count("SELECT COUNT(*) FROM relative_values WHERE rv IS NOT NULL")?,
        })
    }
}

fn write_traits(conn: &Connection, id: i64, traits: &[TraitScore]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO trait_grades (report_id, position, trait_name, grade) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, score) in traits.iter().enumerate() {
        stmt.execute(params![
            id,
            position as i64,
            score.name,
            score.grade.map(|g| g.as_char().to_string()),
        ])?;
    }
    Ok(())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

fn status_code(status: ExtractionStatus) -> &'static str {
    match status {
        ExtractionStatus::Success => "success",
        ExtractionStatus::Partial => "partial",
        ExtractionStatus::Failed => "failed",
    }
}

fn parse_status(raw: &str) -> ExtractionStatus {
    match raw {
        "success" => ExtractionStatus::Success,
        "failed" => ExtractionStatus::Failed,
        _ => ExtractionStatus::Partial,
    }
}

/// Column values of one `reports` row joined with its cached RV.
struct RawReport {
    id: i64,
    source_path: Option<String>,
    text: [Option<String>; 15],
    not_observed: bool,
    fra: Option<i64>,
    status: String,
    pages_json: String,
    issues_json: String,
    created_at: String,
    rv_row: Option<i64>,
    rv: Option<i64>,
    anchors: [Option<i64>; 4],
    computed_at: Option<String>,
}

impl RawReport {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut text: [Option<String>; 15] = Default::default();
        for (i, slot) in text.iter_mut().enumerate() {
            *slot = row.get(2 + i)?;
        }
        Ok(Self {
            id: row.get(0)?,
            source_path: row.get(1)?,
            text,
            not_observed: row.get(17)?,
            fra: row.get(18)?,
            status: row.get(19)?,
            pages_json: row.get(20)?,
            issues_json: row.get(21)?,
            created_at: row.get::<_, Option<String>>(22)?.unwrap_or_default(),
            rv_row: row.get(23)?,
            rv: row.get(24)?,
            anchors: [row.get(25)?, row.get(26)?, row.get(27)?, row.get(28)?],
            computed_at: row.get(29)?,
        })
    }

    fn into_stored(self, traits: Vec<TraitScore>) -> Result<StoredReport> {
        let [fitrep_id, last_name, first_name, edipi, rank, occasion, period_from, period_to, organization, rs_last_name, rs_rank, rs_edipi, ro_last_name, ro_rank, ro_edipi] =
            self.text;
        let rank_of = |code: Option<String>| code.as_deref().and_then(Rank::from_code);

        let report = ExtractedReport {
            fitrep_id,
            last_name,
            first_name,
            edipi,
            rank: rank_of(rank),
            occasion: occasion.as_deref().and_then(OccasionCode::from_code),
            period_from: period_from.as_deref().and_then(parse_date),
            period_to: period_to.as_deref().and_then(parse_date),
            organization,
            reporting_senior: OfficerIdentity {
                last_name: rs_last_name,
                rank: rank_of(rs_rank),
                edipi: rs_edipi,
            },
            reviewing_officer: OfficerIdentity {
                last_name: ro_last_name,
                rank: rank_of(ro_rank),
                edipi: ro_edipi,
            },
            not_observed: self.not_observed,
            traits,
            fra: self.fra.map(Fra::from_hundredths),
            pages: serde_json::from_str(&self.pages_json)?,
            issues: serde_json::from_str(&self.issues_json)?,
            status: parse_status(&self.status),
        };

        let relative_value = self.rv_row.map(|_| {
            let anchors = match self.anchors {
                [Some(max), Some(mean), Some(floor), Some(size)] => Some(RvAnchors {
                    max_fra: Fra::from_hundredths(max),
                    mean_fra: Fra::from_hundredths(mean),
                    floor_fra: Fra::from_hundredths(floor),
                    cohort_size: size as usize,
                }),
                _ => None,
            };
            CachedRv {
                rv: self.rv.and_then(|v| u8::try_from(v).ok()),
                anchors,
                computed_at: self.computed_at.unwrap_or_default(),
            }
        });

        Ok(StoredReport {
            id: self.id,
            source_path: self.source_path,
            created_at: self.created_at,
            report,
            relative_value,
        })
    }
}
