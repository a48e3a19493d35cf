// Field location by label proximity over page layouts
//
// Page 1 carries the administrative block; the following pages carry the 14
// trait rows. Everything here is driven by `FormTables`.
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::codes::{OccasionCode, Rank, TraitGrade};
use super::labels::{allowed_edits, edit_distance, match_key, FieldId, FieldSpec, FormTables, SearchRule, Section, ValueKind};
use super::normalize::Normalizer;
use super::report::{ExtractedReport, FieldIssue};
use crate::pdf_extraction::{BBox, PageLayout, TextLine, Token};

/// Occurrence of a label: tokens `start..=end` of line `line`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelHit {
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub bbox: BBox,
}

/// A page with its lines grouped once.
pub struct PageView<'p> {
    pub page: &'p PageLayout,
    pub lines: Vec<TextLine>,
    line_of: Vec<usize>,
}

impl<'p> PageView<'p> {
    pub fn new(page: &'p PageLayout) -> Self {
        let lines = page.lines();
        let mut line_of = vec![0; page.tokens.len()];
        for (li, line) in lines.iter().enumerate() {
            for &t in &line.tokens {
                line_of[t] = li;
            }
        }
        Self { page, lines, line_of }
    }

    fn token(&self, idx: usize) -> &Token {
        &self.page.tokens[idx]
    }

    fn reading_order(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().flat_map(|line| line.tokens.iter().copied())
    }

    /// Token-aligned, punctuation-blind, fuzzy phrase search.
    pub fn find_phrase(&self, phrase: &str) -> Vec<LabelHit> {
        let target = match_key(phrase);
        let target_len = target.chars().count();
        if target_len == 0 {
            return Vec::new();
        }
        let budget = allowed_edits(target_len);

        let mut hits = Vec::new();
        for (li, line) in self.lines.iter().enumerate() {
            let keys: Vec<String> = line.tokens.iter().map(|&t| match_key(&self.token(t).text)).collect();
            let mut start = 0;
            while start < keys.len() {
                if keys[start].is_empty() {
                    start += 1;
                    continue;
                }
                let mut joined = String::new();
                let mut matched = None;
                for (end, key) in keys.iter().enumerate().skip(start) {
                    joined.push_str(key);
                    let len = joined.chars().count();
                    if len + budget < target_len {
                        continue;
                    }
                    if edit_distance(&joined, &target) <= budget {
                        matched = Some(end);
                        break;
                    }
                    if len >= target_len + budget {
                        break;
                    }
                }

                match matched {
                    Some(end) => {
                        // Shed leading tokens the match does not need.
                        while start < end && edit_distance(&keys[start + 1..=end].concat(), &target) <= budget {
                            start += 1;
                        }
                        let bbox = line.tokens[start..=end]
                            .iter()
                            .map(|&t| self.token(t).bbox)
                            .reduce(|a, b| a.union(&b))
                            .unwrap_or(line.bbox);
                        hits.push(LabelHit { line: li, start, end, bbox });
                        start = end + 1;
                    }
                    None => start += 1,
                }
            }
        }
        hits
    }

    fn hit_tokens(&self, hit: &LabelHit) -> &[usize] {
        &self.lines[hit.line].tokens[hit.start..=hit.end]
    }
}

/// Vertical slice of a page, by token center.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    top: f32,
    bottom: f32,
}

impl Band {
    const FULL: Band = Band {
        top: f32::MIN,
        bottom: f32::MAX,
    };

    fn contains(&self, bbox: &BBox) -> bool {
        let y = bbox.center_y();
        y >= self.top && y < self.bottom
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Rank(Rank),
    Occasion(OccasionCode),
    Date(NaiveDate),
    Grade(TraitGrade),
}

#[derive(Debug, Clone, PartialEq)]
enum Lookup {
    Found { value: FieldValue, token: usize },
    Invalid(String),
    NotFound,
}

impl Lookup {
    fn is_found(&self) -> bool {
        matches!(self, Lookup::Found { .. })
    }

    fn text(&self) -> Option<&str> {
        match self {
            Lookup::Found {
                value: FieldValue::Text(s),
                ..
            } => Some(s),
            _ => None,
        }
    }
}

struct Candidate {
    token: usize,
    distance: f32,
    below: bool,
}

/// Stateless locator over shared tables.
pub struct FieldLocator<'a> {
    tables: &'a FormTables,
    normalizer: &'a Normalizer,
}

impl<'a> FieldLocator<'a> {
    pub fn new(tables: &'a FormTables, normalizer: &'a Normalizer) -> Self {
        Self { tables, normalizer }
    }

    /// Locate everything the pages offer. Readable pages only; page index 0
    /// is the administrative page.
    pub fn locate(&self, pages: &[&PageLayout]) -> ExtractedReport {
        let mut report = ExtractedReport::default();
        let views: Vec<PageView> = pages.iter().map(|p| PageView::new(p)).collect();

        match views.iter().find(|v| v.page.page_index == 0) {
            Some(admin) => {
                self.locate_admin(admin, &mut report);
                report.not_observed = self.not_observed(admin);
            }
            None => {
                debug!("page 1 unavailable, administrative fields not located");
                report
                    .issues
                    .extend(self.tables.fields.iter().map(|spec| FieldIssue::not_found(spec.field)));
            }
        }

        let mut trait_views: Vec<&PageView> = views.iter().filter(|v| v.page.page_index > 0).collect();
        if trait_views.is_empty() {
            trait_views = views.iter().collect();
        }
        self.locate_traits(&trait_views, &mut report);
        report
    }

    fn section_bands(&self, view: &PageView) -> HashMap<Section, Band> {
        let first_y = |phrases: &[String]| {
            phrases
                .iter()
                .flat_map(|p| view.find_phrase(p))
                .map(|hit| hit.bbox.y0)
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        };
        let rs = first_y(&self.tables.reporting_senior_anchors);
        let ro = first_y(&self.tables.reviewing_officer_anchors);

        let mut bands = HashMap::new();
        bands.insert(Section::Any, Band::FULL);
        bands.insert(
            Section::Marine,
            Band {
                top: f32::MIN,
                bottom: rs.or(ro).unwrap_or(f32::MAX),
            },
        );
        if let Some(top) = rs {
            let bottom = ro.filter(|&y| y > top).unwrap_or(f32::MAX);
            bands.insert(Section::ReportingSenior, Band { top, bottom });
        }
        if let Some(top) = ro {
            bands.insert(Section::ReviewingOfficer, Band { top, bottom: f32::MAX });
        }
        bands
    }

    fn locate_admin(&self, view: &PageView, report: &mut ExtractedReport) {
        let bands = self.section_bands(view);
        let mut results: BTreeMap<FieldId, Lookup> = BTreeMap::new();
        for spec in &self.tables.fields {
            let lookup = match bands.get(&spec.section) {
                Some(band) => self.locate_field(view, spec, *band),
                None => Lookup::NotFound,
            };
            results.insert(spec.field, lookup);
        }

        self.fill_edipis(view, &mut results);
        self.fill_officer_names(view, &mut results);
        if let Some(band) = bands.get(&Section::Marine) {
            self.fill_rank(view, *band, &mut results);
        }
        self.fill_period_to(view, &mut results);

        for (field, lookup) in results {
            match lookup {
                Lookup::Found { value, .. } => assign(report, field, value),
                Lookup::Invalid(raw) => report.issues.push(FieldIssue::invalid(field, raw)),
                Lookup::NotFound => report.issues.push(FieldIssue::not_found(field)),
            }
        }
    }

    fn locate_field(&self, view: &PageView, spec: &FieldSpec, band: Band) -> Lookup {
        let hits: Vec<LabelHit> = spec
            .labels
            .iter()
            .flat_map(|label| view.find_phrase(label))
            .filter(|hit| band.contains(&hit.bbox))
            .collect();
        if hits.is_empty() {
            return Lookup::NotFound;
        }

        let mut candidates: Vec<Candidate> = hits
            .iter()
            .flat_map(|hit| self.candidates(view, hit, &spec.rule, band))
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.below.cmp(&b.below))
                .then(view.line_of[a.token].cmp(&view.line_of[b.token]))
        });

        let mut invalid = None;
        for candidate in &candidates {
            if let Some(value) = self.value_of(view, spec.kind, candidate.token) {
                return Lookup::Found {
                    value,
                    token: candidate.token,
                };
            }
            let raw = view.token(candidate.token).text.trim();
            let cleaned = Normalizer::clean(raw);
            if invalid.is_none() && !cleaned.is_empty() && !self.tables.is_label_word(&cleaned) {
                invalid = Some(raw.to_string());
            }
        }
        invalid.map_or(Lookup::NotFound, Lookup::Invalid)
    }

    /// Tokens right of the label on its line, and tokens below it in its column.
    fn candidates(&self, view: &PageView, hit: &LabelHit, rule: &SearchRule, band: Band) -> Vec<Candidate> {
        let own = view.hit_tokens(hit);
        let column = BBox::new(
            hit.bbox.x0 - rule.column_slack,
            hit.bbox.y0,
            hit.bbox.x1 + rule.column_slack,
            hit.bbox.y1,
        );

        view.page
            .tokens
            .iter()
            .enumerate()
            .filter(|(idx, tok)| !own.contains(idx) && !tok.text.trim().is_empty() && band.contains(&tok.bbox))
            .filter_map(|(idx, tok)| {
                if view.line_of[idx] == hit.line {
                    let dx = (tok.bbox.x0 - hit.bbox.x1).max(0.0);
                    (tok.bbox.x0 >= hit.bbox.x1 - 1.0 && dx <= rule.max_dx).then_some(Candidate {
                        token: idx,
                        distance: dx,
                        below: false,
                    })
                } else if tok.bbox.center_y() > hit.bbox.y1 {
                    let dy = (tok.bbox.y0 - hit.bbox.y1).max(0.0);
                    (dy <= rule.max_dy && tok.bbox.horizontal_overlap(&column) > 0.0).then(|| Candidate {
                        token: idx,
                        distance: dy + (tok.bbox.x0 - hit.bbox.x0).abs() / 4.0,
                        below: true,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    fn value_of(&self, view: &PageView, kind: ValueKind, token: usize) -> Option<FieldValue> {
        let raw = view.token(token).text.as_str();
        match kind {
            ValueKind::Name => self
                .normalizer
                .name(raw, 2)
                .filter(|n| !self.tables.is_label_word(n))
                .map(FieldValue::Text),
            ValueKind::Rank => self.normalizer.rank(raw).map(FieldValue::Rank),
            ValueKind::Occasion => self.normalizer.occasion(raw).map(FieldValue::Occasion),
            ValueKind::Date => self.normalizer.date(raw).map(FieldValue::Date),
            ValueKind::Edipi => self.normalizer.edipi(raw).map(FieldValue::Text),
            ValueKind::FitrepId => self.normalizer.fitrep_id(raw).map(FieldValue::Text),
            ValueKind::Text => self.text_run(view, token).map(FieldValue::Text),
        }
    }

    /// Free text: the token and its right neighbours up to the next label word or gap.
    fn text_run(&self, view: &PageView, start: usize) -> Option<String> {
        let first = view.token(start);
        let cleaned = Normalizer::clean(&first.text);
        if cleaned.chars().filter(|c| c.is_alphanumeric()).count() < 2 || self.tables.is_label_word(&cleaned) {
            return None;
        }

        let line = &view.lines[view.line_of[start]];
        let pos = line.tokens.iter().position(|&t| t == start)?;
        let mut words = vec![first.text.trim().to_string()];
        let mut prev = first.bbox;
        for &t in &line.tokens[pos + 1..] {
            let tok = view.token(t);
            if tok.bbox.x0 - prev.x1 > 3.0 * prev.height().max(4.0) {
                break;
            }
            if self.tables.is_label_word(&Normalizer::clean(&tok.text)) {
                break;
            }
            words.push(tok.text.trim().to_string());
            prev = tok.bbox;
        }
        Some(words.join(" "))
    }

    /// Unlabelled EDIPIs in reading order belong to Marine, reporting senior, reviewing officer.
    fn fill_edipis(&self, view: &PageView, results: &mut BTreeMap<FieldId, Lookup>) {
        let slots = [FieldId::Edipi, FieldId::RsEdipi, FieldId::RoEdipi];
        if slots.iter().all(|f| results.get(f).map_or(false, Lookup::is_found)) {
            return;
        }

        let mut sequence: Vec<(String, usize)> = Vec::new();
        for t in view.reading_order() {
            if let Some(edipi) = self.normalizer.edipi(&view.token(t).text) {
                if !sequence.iter().any(|(e, _)| *e == edipi) {
                    sequence.push((edipi, t));
                }
            }
        }

        let mut taken: Vec<String> = slots
            .iter()
            .filter_map(|f| results.get(f).and_then(Lookup::text).map(String::from))
            .collect();
        for (i, field) in slots.iter().enumerate() {
            if results.get(field).map_or(false, Lookup::is_found) {
                continue;
            }
            if let Some((edipi, token)) = sequence.get(i) {
                if !taken.contains(edipi) {
                    debug!("{:?} taken from EDIPI sequence position {}", field, i + 1);
                    taken.push(edipi.clone());
                    results.insert(
                        *field,
                        Lookup::Found {
                            value: FieldValue::Text(edipi.clone()),
                            token: *token,
                        },
                    );
                }
            }
        }
    }

    /// Officer last name from the line carrying that officer's EDIPI.
    fn fill_officer_names(&self, view: &PageView, results: &mut BTreeMap<FieldId, Lookup>) {
        let pairs = [
            (FieldId::RsLastName, FieldId::RsEdipi),
            (FieldId::RoLastName, FieldId::RoEdipi),
        ];
        for (name_field, edipi_field) in pairs {
            if results.get(&name_field).map_or(false, Lookup::is_found) {
                continue;
            }
            let edipi_token = match results.get(&edipi_field) {
                Some(Lookup::Found { token, .. }) => *token,
                _ => continue,
            };

            let line = &view.lines[view.line_of[edipi_token]];
            let name = line.tokens.iter().filter(|&&t| t != edipi_token).find_map(|&t| {
                self.normalizer
                    .name(&view.token(t).text, 3)
                    .filter(|n| !self.tables.is_label_word(n))
                    .map(|n| (n, t))
            });
            if let Some((name, token)) = name {
                debug!("{:?} taken from the EDIPI line", name_field);
                results.insert(
                    name_field,
                    Lookup::Found {
                        value: FieldValue::Text(name),
                        token,
                    },
                );
            }
        }
    }

    /// First valid rank in the top third of the Marine block.
    fn fill_rank(&self, view: &PageView, band: Band, results: &mut BTreeMap<FieldId, Lookup>) {
        if results.get(&FieldId::Rank).map_or(false, Lookup::is_found) {
            return;
        }
        let limit = view.page.height / 3.0;
        let found = view.reading_order().find_map(|t| {
            let tok = view.token(t);
            if tok.bbox.center_y() >= limit || !band.contains(&tok.bbox) {
                return None;
            }
            self.normalizer.rank(&tok.text).map(|rank| (rank, t))
        });
        if let Some((rank, token)) = found {
            debug!("rank {} taken from the top of page 1", rank);
            results.insert(
                FieldId::Rank,
                Lookup::Found {
                    value: FieldValue::Rank(rank),
                    token,
                },
            );
        }
    }

    /// Latest date on the page stands in for an unlabelled period end.
    fn fill_period_to(&self, view: &PageView, results: &mut BTreeMap<FieldId, Lookup>) {
        if results.get(&FieldId::PeriodTo).map_or(false, Lookup::is_found) {
            return;
        }
        let latest = view
            .reading_order()
            .filter_map(|t| self.normalizer.date(&view.token(t).text).map(|d| (d, t)))
            .max_by_key(|(d, _)| *d);
        if let Some((date, token)) = latest {
            debug!("period end {} taken from the latest date on page 1", date);
            results.insert(
                FieldId::PeriodTo,
                Lookup::Found {
                    value: FieldValue::Date(date),
                    token,
                },
            );
        }
    }

    fn not_observed(&self, view: &PageView) -> bool {
        const REACH: f32 = 60.0;
        self.tables
            .not_observed_labels
            .iter()
            .flat_map(|label| view.find_phrase(label))
            .any(|hit| {
                let own = view.hit_tokens(&hit);
                view.lines[hit.line].tokens.iter().any(|t| {
                    let tok = view.token(*t);
                    !own.contains(t)
                        && Normalizer::is_check_mark(&tok.text)
                        && tok.bbox.x1 >= hit.bbox.x0 - REACH
                        && tok.bbox.x0 <= hit.bbox.x1 + REACH
                })
            })
    }

    fn locate_traits(&self, views: &[&PageView], report: &mut ExtractedReport) {
        let position = |(view, hit): &(usize, LabelHit)| (*view, hit.line, hit.start);

        let hits: Vec<Vec<(usize, LabelHit)>> = self
            .tables
            .traits
            .iter()
            .map(|spec| {
                let mut found: Vec<(usize, LabelHit)> = views
                    .iter()
                    .enumerate()
                    .flat_map(|(vi, view)| {
                        spec.aliases
                            .iter()
                            .flat_map(move |alias| view.find_phrase(alias).into_iter().map(move |hit| (vi, hit)))
                    })
                    .collect();
                found.sort_by_key(position);
                found.dedup_by_key(|c| position(c));
                found
            })
            .collect();

        let mut previous: Option<(usize, usize, usize)> = None;
        for (index, found) in hits.iter().enumerate() {
            let field = FieldId::Trait(index);
            let following: Vec<&(usize, LabelHit)> =
                found.iter().filter(|c| previous.map_or(true, |p| position(c) > p)).collect();
            let pool: Vec<&(usize, LabelHit)> = if following.is_empty() { found.iter().collect() } else { following };

            let graded = pool.iter().find_map(|c| match self.grade_on_row(views[c.0], &c.1) {
                lookup @ Lookup::Found { .. } => Some((*c, lookup)),
                _ => None,
            });
            let chosen = graded.or_else(|| pool.first().map(|c| (*c, self.grade_on_row(views[c.0], &c.1))));

            let (hit, lookup) = match chosen {
                Some(choice) => choice,
                None => {
                    report.issues.push(FieldIssue::not_found(field));
                    continue;
                }
            };
            previous = Some(position(hit));

            match lookup {
                Lookup::Found {
                    value: FieldValue::Grade(grade),
                    ..
                } => report.traits[index].grade = Some(grade),
                Lookup::Invalid(raw) => report.issues.push(FieldIssue::invalid(field, raw)),
                _ => report.issues.push(FieldIssue::not_found(field)),
            }
        }
    }

    /// Nearest line at or above `line` carrying enough distinct A..H letters.
    fn header_columns(&self, view: &PageView, line: usize) -> Option<(usize, Vec<(TraitGrade, usize)>)> {
        (0..=line).rev().find_map(|li| {
            let mut columns: Vec<(TraitGrade, usize)> = Vec::new();
            for &t in &view.lines[li].tokens {
                let text = view.token(t).text.trim();
                let mut chars = text.chars();
                let grade = match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_uppercase() => TraitGrade::from_char(c),
                    _ => None,
                };
                if let Some(grade) = grade {
                    if !columns.iter().any(|(g, _)| *g == grade) {
                        columns.push((grade, t));
                    }
                }
            }
            (columns.len() >= self.tables.min_header_letters).then_some((li, columns))
        })
    }

    /// Grade on the trait's row: a letter or a check mark. Under a header only
    /// tokens inside a column region count, and a mark takes that column's letter.
    fn grade_on_row(&self, view: &PageView, hit: &LabelHit) -> Lookup {
        let line = &view.lines[hit.line];
        let header = self.header_columns(view, hit.line);
        let header_tokens: Vec<usize> = match &header {
            Some((li, columns)) if *li == hit.line => columns.iter().map(|(_, t)| *t).collect(),
            _ => Vec::new(),
        };
        let regions = header.as_ref().map(|(_, columns)| column_regions(view, columns));

        let mut mark = None;
        let mut stray = None;
        for &t in &line.tokens[hit.end + 1..] {
            if header_tokens.contains(&t) {
                continue;
            }
            let tok = view.token(t);
            let raw = tok.text.trim();
            let column = match &regions {
                Some(regions) => match column_at(regions, tok.bbox.center_x()) {
                    Some(grade) => Some(grade),
                    None => continue,
                },
                None => None,
            };

            if Normalizer::is_check_mark(raw) {
                match column {
                    Some(grade) => {
                        return Lookup::Found {
                            value: FieldValue::Grade(grade),
                            token: t,
                        }
                    }
                    None => {
                        mark.get_or_insert(t);
                        continue;
                    }
                }
            }
            if let Some(grade) = self.letter_grade(raw) {
                return Lookup::Found {
                    value: FieldValue::Grade(grade),
                    token: t,
                };
            }
            if stray.is_none() && Normalizer::clean(raw).chars().count() == 1 {
                stray = Some(raw.to_string());
            }
        }

        match mark {
            Some(t) => Lookup::Invalid(view.token(t).text.trim().to_string()),
            None => stray.map_or(Lookup::NotFound, Lookup::Invalid),
        }
    }

    /// A lone upper-case A..H, brackets allowed.
    fn letter_grade(&self, raw: &str) -> Option<TraitGrade> {
        let inner = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let mut chars = inner.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => self.normalizer.grade(inner),
            _ => None,
        }
    }
}

/// Each header letter owns the x span halfway to its neighbours.
fn column_regions(view: &PageView, columns: &[(TraitGrade, usize)]) -> Vec<(TraitGrade, f32, f32)> {
    let mut centers: Vec<(TraitGrade, f32, f32)> = columns
        .iter()
        .map(|&(grade, t)| {
            let bbox = view.token(t).bbox;
            (grade, bbox.center_x(), bbox.width())
        })
        .collect();
    centers.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    (0..centers.len())
        .map(|i| {
            let (grade, x, width) = centers[i];
            let left = match i.checked_sub(1).map(|p| centers[p].1) {
                Some(prev) => (prev + x) / 2.0,
                None => centers.get(i + 1).map_or(x - width, |next| x - (next.1 - x) / 2.0),
            };
            let right = match centers.get(i + 1).map(|next| next.1) {
                Some(next) => (x + next) / 2.0,
                None => i.checked_sub(1).map_or(x + width, |p| x + (x - centers[p].1) / 2.0),
            };
            (grade, left, right)
        })
        .collect()
}

fn column_at(regions: &[(TraitGrade, f32, f32)], x: f32) -> Option<TraitGrade> {
    regions
        .iter()
        .find(|(_, left, right)| x >= *left && x < *right)
        .map(|(grade, _, _)| *grade)
}

fn assign(report: &mut ExtractedReport, field: FieldId, value: FieldValue) {
    match (field, value) {
        (FieldId::FitrepId, FieldValue::Text(s)) => report.fitrep_id = Some(s),
        (FieldId::LastName, FieldValue::Text(s)) => report.last_name = Some(s),
        (FieldId::FirstName, FieldValue::Text(s)) => report.first_name = Some(s),
        (FieldId::Edipi, FieldValue::Text(s)) => report.edipi = Some(s),
        (FieldId::Rank, FieldValue::Rank(r)) => report.rank = Some(r),
        (FieldId::Occasion, FieldValue::Occasion(o)) => report.occasion = Some(o),
        (FieldId::PeriodFrom, FieldValue::Date(d)) => report.period_from = Some(d),
        (FieldId::PeriodTo, FieldValue::Date(d)) => report.period_to = Some(d),
        (FieldId::Organization, FieldValue::Text(s)) => report.organization = Some(s),
        (FieldId::RsLastName, FieldValue::Text(s)) => report.reporting_senior.last_name = Some(s),
        (FieldId::RsRank, FieldValue::Rank(r)) => report.reporting_senior.rank = Some(r),
        (FieldId::RsEdipi, FieldValue::Text(s)) => report.reporting_senior.edipi = Some(s),
        (FieldId::RoLastName, FieldValue::Text(s)) => report.reviewing_officer.last_name = Some(s),
        (FieldId::RoRank, FieldValue::Rank(r)) => report.reviewing_officer.rank = Some(r),
        (FieldId::RoEdipi, FieldValue::Text(s)) => report.reviewing_officer.edipi = Some(s),
        (field, value) => debug!("ignoring {:?} value {:?}", field, value),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fitrep::report::ExtractionStatus;
    use crate::pdf_extraction::TextTier;

    pub(crate) const FIXTURE_GRADES: [&str; 14] = ["D", "E", "D", "E", "F", "D", "C", "E", "D", "D", "E", "D", "E", "F"];

    pub(crate) fn tok(text: &str, x: f32, y: f32) -> Token {
        let width = 6.0 * text.chars().count() as f32;
        Token::new(text, BBox::new(x, y, x + width, y + 10.0))
    }

    fn words(tokens: &mut Vec<Token>, phrase: &str, mut x: f32, y: f32) {
        for word in phrase.split_whitespace() {
            tokens.push(tok(word, x, y));
            x += 6.0 * word.chars().count() as f32 + 6.0;
        }
    }

    fn column_x(letter: &str) -> f32 {
        let index = TraitGrade::from_letter(letter).map_or(0, |g| g as usize);
        300.0 + 30.0 * index as f32
    }

    pub(crate) fn admin_page(not_observed: bool) -> PageLayout {
        let mut t = Vec::new();
        words(&mut t, "USMC FITNESS REPORT", 40.0, 10.0);
        words(&mut t, "FITREP ID", 40.0, 40.0);
        t.push(tok("1234567", 150.0, 40.0));

        for (label, x) in [("LAST NAME", 40.0), ("FIRST NAME", 160.0), ("EDIPI", 280.0), ("GRADE", 380.0), ("OCC", 460.0)] {
            words(&mut t, label, x, 80.0);
        }
        for (value, x) in [("SMITH", 40.0), ("JOHN", 160.0), ("1234567890", 280.0), ("CAPT", 380.0), ("AN", 460.0)] {
            t.push(tok(value, x, 95.0));
        }

        t.push(tok("FROM", 40.0, 130.0));
        t.push(tok("20230101", 80.0, 130.0));
        t.push(tok("TO", 160.0, 130.0));
        t.push(tok("20231231", 185.0, 130.0));
        words(&mut t, "ORGANIZATION 1ST BN 5TH MARINES", 40.0, 160.0);

        words(&mut t, "NOT OBSERVED", 40.0, 200.0);
        if not_observed {
            t.push(tok("X", 20.0, 200.0));
        }

        for (anchor, name, rank, edipi, y) in [
            ("REPORTING SENIOR", "JONES", "LTCOL", "2345678901", 300.0),
            ("REVIEWING OFFICER", "BROWN", "COL", "3456789012", 400.0),
        ] {
            words(&mut t, anchor, 40.0, y);
            words(&mut t, "LAST NAME", 40.0, y + 20.0);
            words(&mut t, "GRADE", 200.0, y + 20.0);
            words(&mut t, "EDIPI", 300.0, y + 20.0);
            t.push(tok(name, 40.0, y + 35.0));
            t.push(tok(rank, 200.0, y + 35.0));
            t.push(tok(edipi, 300.0, y + 35.0));
        }
        PageLayout::new(0, 612.0, 792.0, TextTier::TextLayer, t)
    }

    fn header(tokens: &mut Vec<Token>) {
        for letter in ["A", "B", "C", "D", "E", "F", "G", "H"] {
            tokens.push(tok(letter, column_x(letter), 40.0));
        }
    }

    /// Trait pages: marks on the first, letters on the second.
    pub(crate) fn trait_pages() -> Vec<PageLayout> {
        let captions = [
            "PERFORMANCE",
            "PROFICIENCY",
            "COURAGE",
            "EFFECTIVENESS UNDER STRESS",
            "INITIATIVE",
            "LEADING SUBORDINATES",
            "DEVELOPING SUBORDINATES",
            "SETTING THE EXAMPLE",
            "ENSURING WELL-BEING OF SUBORDINATES",
            "COMMUNICATION SKILLS",
            "PROFESSIONAL MILITARY EDUCATION",
            "DECISION MAKING ABILITY",
            "JUDGMENT",
            "EVALUATIONS",
        ];

        let mut first = Vec::new();
        let mut second = Vec::new();
        header(&mut first);
        header(&mut second);
        for (i, (caption, grade)) in captions.iter().zip(FIXTURE_GRADES).enumerate() {
            if i < 7 {
                let y = 70.0 + 30.0 * i as f32;
                words(&mut first, caption, 40.0, y);
                first.push(tok("X", column_x(grade), y));
            } else {
                let y = 70.0 + 30.0 * (i - 7) as f32;
                words(&mut second, caption, 40.0, y);
                second.push(tok(grade, column_x(grade), y));
            }
        }
        vec![
            PageLayout::new(1, 612.0, 792.0, TextTier::TextLayer, first),
            PageLayout::new(2, 612.0, 792.0, TextTier::Ocr, second),
        ]
    }

    pub(crate) fn form_pages() -> Vec<PageLayout> {
        let mut pages = vec![admin_page(false)];
        pages.extend(trait_pages());
        pages
    }

    fn locate(pages: &[PageLayout]) -> ExtractedReport {
        let tables = FormTables::default();
        let normalizer = Normalizer::default();
        let refs: Vec<&PageLayout> = pages.iter().collect();
        FieldLocator::new(&tables, &normalizer).locate(&refs)
    }

    #[test]
    fn test_find_phrase_is_token_aligned_and_fuzzy() {
        let mut t = Vec::new();
        words(&mut t, "B. PR0FICIENCY GRADE: MAJ", 40.0, 10.0);
        let page = PageLayout::new(1, 612.0, 792.0, TextTier::Ocr, t);
        let view = PageView::new(&page);

        let hits = view.find_phrase("PROFICIENCY");
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].start, hits[0].end), (1, 1));
        assert_eq!(view.find_phrase("GRADE").len(), 1);
        assert!(view.find_phrase("GRAD").is_empty());
        assert!(view.find_phrase("ADE").is_empty());
    }

    #[test]
    fn test_find_phrase_sheds_a_leading_neighbour() {
        let mut t = Vec::new();
        t.push(tok("X", 20.0, 10.0));
        words(&mut t, "NOT OBSERVED", 40.0, 10.0);
        let page = PageLayout::new(0, 612.0, 792.0, TextTier::TextLayer, t);
        let view = PageView::new(&page);

        let hits = view.find_phrase("NOT OBSERVED");
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].start, hits[0].end), (1, 2));
    }

    #[test]
    fn test_locates_a_complete_form() {
        let report = locate(&form_pages());

        assert_eq!(report.fitrep_id.as_deref(), Some("1234567"));
        assert_eq!(report.last_name.as_deref(), Some("SMITH"));
        assert_eq!(report.first_name.as_deref(), Some("JOHN"));
        assert_eq!(report.edipi.as_deref(), Some("1234567890"));
        assert_eq!(report.rank, Some(Rank::Capt));
        assert_eq!(report.occasion, Some(OccasionCode::Annual));
        assert_eq!(report.period_from, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(report.period_to, NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(report.organization.as_deref(), Some("1ST BN 5TH MARINES"));
        assert_eq!(report.reporting_senior.last_name.as_deref(), Some("JONES"));
        assert_eq!(report.reporting_senior.rank, Some(Rank::LtCol));
        assert_eq!(report.reporting_senior.edipi.as_deref(), Some("2345678901"));
        assert_eq!(report.reviewing_officer.last_name.as_deref(), Some("BROWN"));
        assert_eq!(report.reviewing_officer.rank, Some(Rank::Col));
        assert!(!report.not_observed);

        let grades: Vec<String> = report.traits.iter().map(|t| t.grade.map(|g| g.to_string()).unwrap_or_default()).collect();
        assert_eq!(grades, FIXTURE_GRADES.to_vec());
        assert!(report.issues.is_empty(), "unexpected issues: {:?}", report.issues);
        assert_eq!(report.derive_status(), ExtractionStatus::Success);
    }

    #[test]
    fn test_not_observed_mark() {
        let report = locate(&[admin_page(true)]);
        assert!(report.not_observed);
    }

    #[test]
    fn test_right_of_label_wins_a_tie_with_below() {
        for below_first in [true, false] {
            let mut t = Vec::new();
            words(&mut t, "FITREP ID", 40.0, 40.0);
            let right = tok("1234567", 104.0, 40.0);
            let below = tok("7654321", 40.0, 60.0);
            if below_first {
                t.extend([below, right]);
            } else {
                t.extend([right, below]);
            }
            let page = PageLayout::new(0, 612.0, 792.0, TextTier::TextLayer, t);

            let report = locate(&[page]);
            assert_eq!(report.fitrep_id.as_deref(), Some("1234567"));
        }
    }

    #[test]
    fn test_row_text_outside_the_columns_is_not_a_grade() {
        let mut t = Vec::new();
        header(&mut t);
        words(&mut t, "PROFICIENCY demonstrates a", 40.0, 70.0);
        t.push(tok("X", column_x("E"), 70.0));
        words(&mut t, "COURAGE A", 40.0, 100.0);
        t.push(tok("c", column_x("C"), 100.0));
        let page = PageLayout::new(1, 612.0, 792.0, TextTier::TextLayer, t);

        let report = locate(&[page]);
        assert_eq!(report.traits[1].grade, Some(TraitGrade::E));
        assert_eq!(report.traits[2].grade, None);
        assert!(report.issues.contains(&FieldIssue::invalid(FieldId::Trait(2), "c")));
    }

    #[test]
    fn test_unlabelled_page_uses_fallbacks() {
        let mut t = Vec::new();
        t.push(tok("SMITH", 40.0, 50.0));
        t.push(tok("MAJ", 120.0, 50.0));
        t.push(tok("1234567890", 200.0, 50.0));
        t.push(tok("20230101", 40.0, 80.0));
        t.push(tok("20231231", 120.0, 80.0));
        words(&mut t, "REPORTING SENIOR", 40.0, 300.0);
        words(&mut t, "JONES LTCOL 2345678901", 40.0, 320.0);
        words(&mut t, "REVIEWING OFFICER", 40.0, 400.0);
        words(&mut t, "USMC BROWN COL 3456789012", 40.0, 420.0);
        let page = PageLayout::new(0, 612.0, 792.0, TextTier::Ocr, t);

        let report = locate(&[page]);
        assert_eq!(report.edipi.as_deref(), Some("1234567890"));
        assert_eq!(report.reporting_senior.edipi.as_deref(), Some("2345678901"));
        assert_eq!(report.reviewing_officer.edipi.as_deref(), Some("3456789012"));
        assert_eq!(report.reporting_senior.last_name.as_deref(), Some("JONES"));
        assert_eq!(report.reviewing_officer.last_name.as_deref(), Some("BROWN"));
        assert_eq!(report.rank, Some(Rank::Maj));
        assert_eq!(report.period_to, NaiveDate::from_ymd_opt(2023, 12, 31));
        assert!(report.has_issue(FieldId::PeriodFrom));
        assert!(report.has_issue(FieldId::LastName));
        assert_eq!(report.derive_status(), ExtractionStatus::Partial);
    }

    #[test]
    fn test_unreadable_rank_is_an_invalid_token() {
        let mut page = admin_page(false);
        for token in &mut page.tokens {
            if token.text == "CAPT" {
                token.text = "CAPTA1N".to_string();
            }
        }
        let report = locate(&[page]);
        assert_eq!(report.rank, None);
        assert!(report.issues.contains(&FieldIssue::invalid(FieldId::Rank, "CAPTA1N")));
    }

    #[test]
    fn test_trait_order_prefers_a_graded_hit() {
        let mut t = Vec::new();
        header(&mut t);
        words(&mut t, "PROFICIENCY", 40.0, 70.0);
        t.push(tok("0", column_x("D"), 70.0));
        words(&mut t, "LEADERSHIP", 40.0, 100.0);
        words(&mut t, "LEADING SUBORDINATES", 40.0, 130.0);
        t.push(tok("E", column_x("E"), 130.0));
        let page = PageLayout::new(1, 612.0, 792.0, TextTier::Ocr, t);

        let report = locate(&[page]);
        assert_eq!(report.traits[5].grade, Some(TraitGrade::E));
        assert_eq!(report.traits[1].grade, None);
        assert!(report.issues.contains(&FieldIssue::invalid(FieldId::Trait(1), "0")));
        assert!(report.issues.contains(&FieldIssue::not_found(FieldId::Trait(12))));
    }
}
