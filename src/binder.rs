//! # Field Binder
//!
//! Builds the per-record [`InputMap`] handed to the renderer. Layers, lowest
//! precedence first:
//!
//! 1. every template field name, set to the empty string
//! 2. computed fields (`todayDate`)
//! 3. same-named record columns
//! 4. operator constant fields, which always win
//!
//! The map is rebuilt from scratch for every record, so nothing carries over
//! from one row to the next.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};

use crate::records::Record;
use crate::template::Template;

/// Computed field holding the generation date as `DD/MM/YYYY`
pub const TODAY_DATE_FIELD: &str = "todayDate";

/// Column used to name output files; always bound from the record
pub const ID_FIELD: &str = "id";

const COMPUTED_FIELDS: [&str; 1] = [TODAY_DATE_FIELD];

/// Field name to the literal text painted into that field.
/// Unknown names read as the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputMap(BTreeMap<String, String>);

impl InputMap {
    pub fn get(&self, field: &str) -> &str {
        self.0.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Operator-entered constant values, applied to every record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantFields(BTreeMap<String, String>);

impl ConstantFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, content: impl Into<String>) {
        self.0.insert(field.into(), content.into());
    }

    pub fn clear(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn clear_all(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Formats a date as `DD/MM/YYYY`, independent of the process locale.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Where the `todayDate` value comes from.
#[derive(Debug, Clone, Copy)]
enum DateSource {
    Pinned(NaiveDate),
    Clock(fn() -> NaiveDate),
}

/// Builds the input map for one record.
///
/// The date is read once per batch through [`FieldBinder::today`] and handed
/// to [`FieldBinder::bind`] for every row of that batch.
#[derive(Debug, Clone, Copy)]
pub struct FieldBinder {
    date: DateSource,
}

impl FieldBinder {
    /// Binder that always prints `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: DateSource::Pinned(today),
        }
    }

    /// Binder that reads the local current date each time it is asked.
    pub fn for_today() -> Self {
        Self::with_clock(local_today)
    }

    pub fn with_clock(clock: fn() -> NaiveDate) -> Self {
        Self {
            date: DateSource::Clock(clock),
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.date, DateSource::Pinned(_))
    }

    /// The date a batch started now should print.
    pub fn today(&self) -> NaiveDate {
        match self.date {
            DateSource::Pinned(date) => date,
            DateSource::Clock(clock) => clock(),
        }
    }

    pub fn bind(
        &self,
        template: &Template,
        record: &Record,
        constants: &ConstantFields,
        today: NaiveDate,
    ) -> InputMap {
        let mut inputs = InputMap::default();

        for field in template.fields() {
            inputs.insert(field.name.as_str(), "");
        }

        inputs.insert(TODAY_DATE_FIELD, format_date(today));

        let record_fields = template
            .fields()
            .map(|field| field.name.as_str())
            .chain(std::iter::once(ID_FIELD))
            .filter(|name| !COMPUTED_FIELDS.contains(name));
        for name in record_fields {
            inputs.insert(name, record.get(name).unwrap_or(""));
        }

        for (name, content) in constants.iter() {
            inputs.insert(name, content);
        }

        inputs
    }
}

impl Default for FieldBinder {
    fn default() -> Self {
        Self::for_today()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::FieldDescriptor;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn binder() -> FieldBinder {
        FieldBinder::new(date(2024, 3, 7))
    }

    fn bind(template: &Template, record: &Record, constants: &ConstantFields) -> InputMap {
        let binder = binder();
        binder.bind(template, record, constants, binder.today())
    }

    static CLOCK_DAY: AtomicU32 = AtomicU32::new(1);

    fn ticking_clock() -> NaiveDate {
        date(2024, 1, CLOCK_DAY.fetch_add(1, Ordering::SeqCst))
    }

    #[test]
    fn test_pinned_binder_keeps_its_date() {
        let binder = FieldBinder::new(date(2024, 3, 7));
        assert!(binder.is_pinned());
        assert_eq!(binder.today(), date(2024, 3, 7));
        assert_eq!(binder.today(), date(2024, 3, 7));
    }

    #[test]
    fn test_unpinned_binder_reads_the_clock_on_every_call() {
        let binder = FieldBinder::with_clock(ticking_clock);
        assert!(!binder.is_pinned());

        let first = binder.today();
        let second = binder.today();
        assert!(second > first, "{} should be after {}", second, first);
    }

    #[test]
    fn test_default_binder_follows_local_date() {
        let binder = FieldBinder::default();
        assert!(!binder.is_pinned());
        let before = Local::now().date_naive();
        let today = binder.today();
        let after = Local::now().date_naive();
        assert!(before <= today && today <= after);
    }

    #[test]
    fn test_bind_prints_the_date_it_is_given() {
        let record = Record::new();
        let inputs = binder().bind(
            &Template::diploma(),
            &record,
            &ConstantFields::new(),
            date(2030, 11, 2),
        );
        assert_eq!(inputs.get(TODAY_DATE_FIELD), "02/11/2030");
    }

    #[test]
    fn test_format_date_is_zero_padded() {
        assert_eq!(format_date(date(2024, 3, 7)), "07/03/2024");
        assert_eq!(format_date(date(1999, 12, 31)), "31/12/1999");
    }

    #[test]
    fn test_binds_matching_columns() {
        let record = Record::from_iter([("id", "1"), ("name", "Ann"), ("unused", "x")]);
        let inputs = bind(&Template::diploma(), &record, &ConstantFields::new());

        assert_eq!(inputs.get("id"), "1");
        assert_eq!(inputs.get("name"), "Ann");
        assert_eq!(inputs.get(TODAY_DATE_FIELD), "07/03/2024");
        assert!(!inputs.contains("unused"));
    }

    #[test]
    fn test_missing_columns_bind_to_empty_string() {
        let inputs = bind(&Template::diploma(), &Record::new(), &ConstantFields::new());

        for field in Template::diploma().fields() {
            assert!(inputs.contains(&field.name), "missing key {}", field.name);
        }
        assert_eq!(inputs.get("birthDate"), "");
        assert_eq!(inputs.get("not-a-field"), "");
    }

    #[test]
    fn test_record_cannot_override_computed_date() {
        let record = Record::from_iter([(TODAY_DATE_FIELD, "01/01/1970")]);
        let inputs = bind(&Template::diploma(), &record, &ConstantFields::new());
        assert_eq!(inputs.get(TODAY_DATE_FIELD), "07/03/2024");
    }

    #[test]
    fn test_constants_override_record_and_computed_values() {
        let mut constants = ConstantFields::new();
        constants.set("name", "Everyone");
        constants.set(TODAY_DATE_FIELD, "soon");
        constants.set("x", "custom");

        let record = Record::from_iter([("name", "Ann")]);
        let inputs = bind(&Template::diploma(), &record, &constants);

        assert_eq!(inputs.get("name"), "Everyone");
        assert_eq!(inputs.get(TODAY_DATE_FIELD), "soon");
        assert_eq!(inputs.get("x"), "custom");
    }

    #[test]
    fn test_each_record_is_bound_from_scratch() {
        let mut template = Template::diploma();
        template.schemas[0].push(FieldDescriptor::text("grade", 0.0, 0.0, 10.0, 10.0, 10.0));

        let first = Record::from_iter([("grade", "A")]);
        let second = Record::from_iter([("name", "Bo")]);
        let constants = ConstantFields::new();

        assert_eq!(bind(&template, &first, &constants).get("grade"), "A");
        assert_eq!(bind(&template, &second, &constants).get("grade"), "");
    }

    #[test]
    fn test_id_is_bound_even_without_template_field() {
        let template = Template {
            schemas: vec![vec![FieldDescriptor::text("name", 0.0, 0.0, 1.0, 1.0, 1.0)]],
            ..Template::diploma()
        };
        let record = Record::from_iter([("id", "42"), ("name", "Cy")]);
        let inputs = bind(&template, &record, &ConstantFields::new());
        assert_eq!(inputs.get(ID_FIELD), "42");
    }
}
