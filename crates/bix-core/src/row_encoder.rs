//! Delimited text format consumed by the encryption tool.
//!
//! ```text
//! NhsNumber,DateOfReferral,...,Coaching00-07,...,Weight85Plus
//! *9999999999,02/01/2024,...,1,...,80.0*
//! ```
//!
//! The header carries no markers. Every data line is wrapped in `*` so the
//! tool can find record boundaries.

use std::fmt::Write;

use bix_types::{ExtractRow, Measurement, ReportDate, DAY_BANDS};

/// Record delimiter required by the encryption tool.
pub const ROW_MARKER: char = '*';

const SEPARATOR: char = ',';

/// One rendered cell.
enum Field<'a> {
    Text(Option<&'a str>),
    Flag(Option<bool>),
    Date(Option<ReportDate>),
    Decimal(Option<&'a Measurement>),
}

impl Field<'_> {
    fn write_to(&self, out: &mut String) {
        match self {
            Field::Text(Some(s)) => write_text(out, s),
            Field::Flag(Some(b)) => out.push(if *b { '1' } else { '0' }),
            Field::Date(Some(d)) => {
                let _ = write!(out, "{d}");
            }
            Field::Decimal(Some(m)) => {
                let _ = write!(out, "{m}");
            }
            Field::Text(None) | Field::Flag(None) | Field::Date(None) | Field::Decimal(None) => {}
        }
    }
}

type Column = (&'static str, fn(&ExtractRow) -> Field<'_>);

/// Columns ahead of the day-band families, in file order.
const LEADING_COLUMNS: &[Column] = &[
    ("NhsNumber", |r| Field::Text(Some(&r.nhs_number))),
    ("DateOfReferral", |r| Field::Date(r.date_of_referral)),
    ("DateOfBmiAtRegistration", |r| Field::Date(r.date_of_bmi_at_registration)),
    ("DateOfProviderSelection", |r| Field::Date(r.date_of_provider_selection)),
    ("DateStartedProgramme", |r| Field::Date(r.date_started_programme)),
    ("DateCompletedProgramme", |r| Field::Date(r.date_completed_programme)),
    ("DatePlacedOnWaitingList", |r| Field::Date(r.date_placed_on_waiting_list)),
    ("DateToDelayUntil", |r| Field::Date(r.date_to_delay_until)),
    ("EthnicityGroup", |r| Field::Text(r.ethnicity_group.as_deref())),
    ("EthnicitySubGroup", |r| Field::Text(r.ethnicity_sub_group.as_deref())),
    ("HasLearningDisability", |r| Field::Flag(r.has_learning_disability)),
    ("HasPhysicalDisability", |r| Field::Flag(r.has_physical_disability)),
    ("HasDiabetesType1", |r| Field::Flag(r.has_diabetes_type1)),
    ("HasDiabetesType2", |r| Field::Flag(r.has_diabetes_type2)),
    ("HasHypertension", |r| Field::Flag(r.has_hypertension)),
    ("IsVulnerable", |r| Field::Flag(r.is_vulnerable)),
    ("OPCSCodesForElectiveCare", |r| {
        Field::Text(r.opcs_codes_for_elective_care.as_deref())
    }),
];

const COACHING: &str = "Coaching";
const ENGAGEMENT: &str = "Engagement";
const WEIGHT: &str = "Weight";
const WEIGHT_85_PLUS: &str = "Weight85Plus";

/// Header names in file order.
pub fn header_columns() -> Vec<String> {
    let mut columns: Vec<String> = LEADING_COLUMNS
        .iter()
        .map(|(name, _)| (*name).to_string())
        .collect();
    for family in [COACHING, ENGAGEMENT, WEIGHT] {
        columns.extend(
            DAY_BANDS
                .iter()
                .map(|(start, end)| format!("{family}{start:02}-{end:02}")),
        );
    }
    columns.push(WEIGHT_85_PLUS.to_string());
    columns
}

fn fields(row: &ExtractRow) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = LEADING_COLUMNS.iter().map(|(_, get)| get(row)).collect();
    fields.extend(row.coaching().into_iter().map(Field::Flag));
    fields.extend(row.engagement().into_iter().map(Field::Flag));
    fields.extend(row.weights().into_iter().map(Field::Decimal));
    fields.push(Field::Decimal(row.weight_85_plus.as_ref()));
    fields
}

/// Render one data line, markers included, without the line terminator.
pub fn encode_row(row: &ExtractRow) -> String {
    let mut line = String::with_capacity(256);
    line.push(ROW_MARKER);
    for (i, field) in fields(row).iter().enumerate() {
        if i > 0 {
            line.push(SEPARATOR);
        }
        field.write_to(&mut line);
    }
    line.push(ROW_MARKER);
    line
}

/// Render a whole batch: header line, then one marked line per row.
pub fn encode_batch(rows: &[ExtractRow]) -> String {
    let mut out = header_columns().join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&encode_row(row));
        out.push('\n');
    }
    out
}

fn write_text(out: &mut String, s: &str) {
    let needs_quotes = s
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\n' | '\r') || c == ROW_MARKER);
    if needs_quotes {
        out.push('"');
        out.push_str(&s.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(s);
    }
}
