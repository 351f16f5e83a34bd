use serde::{Deserialize, Serialize};

use crate::values::{Measurement, ReportDate};

/// Day bands `[start, end]` of the per-band families, days 0 to 84.
pub const DAY_BANDS: [(u8, u8); 12] = [
    (0, 7),
    (8, 14),
    (15, 21),
    (22, 28),
    (29, 35),
    (36, 42),
    (43, 49),
    (50, 56),
    (57, 63),
    (64, 70),
    (71, 77),
    (78, 84),
];

/// One referral as returned by the reporting API.
///
/// Only the NHS number is mandatory. The struct is read-only for the
/// pipeline: it is decoded, rendered once and dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRow {
    pub nhs_number: String,

    #[serde(default)]
    pub date_of_referral: Option<ReportDate>,
    #[serde(default)]
    pub date_of_bmi_at_registration: Option<ReportDate>,
    #[serde(default)]
    pub date_of_provider_selection: Option<ReportDate>,
    #[serde(default)]
    pub date_started_programme: Option<ReportDate>,
    #[serde(default)]
    pub date_completed_programme: Option<ReportDate>,
    #[serde(default)]
    pub date_placed_on_waiting_list: Option<ReportDate>,
    #[serde(default)]
    pub date_to_delay_until: Option<ReportDate>,

    #[serde(default)]
    pub ethnicity_group: Option<String>,
    #[serde(default)]
    pub ethnicity_sub_group: Option<String>,
    #[serde(default)]
    pub has_learning_disability: Option<bool>,
    #[serde(default)]
    pub has_physical_disability: Option<bool>,
    #[serde(default)]
    pub has_diabetes_type1: Option<bool>,
    #[serde(default)]
    pub has_diabetes_type2: Option<bool>,
    #[serde(default)]
    pub has_hypertension: Option<bool>,
    #[serde(default)]
    pub is_vulnerable: Option<bool>,
    #[serde(default)]
    pub opcs_codes_for_elective_care: Option<String>,

    // Coaching sessions held, by day band
    #[serde(default)]
    pub coaching_00_07: Option<bool>,
    #[serde(default)]
    pub coaching_08_14: Option<bool>,
    #[serde(default)]
    pub coaching_15_21: Option<bool>,
    #[serde(default)]
    pub coaching_22_28: Option<bool>,
    #[serde(default)]
    pub coaching_29_35: Option<bool>,
    #[serde(default)]
    pub coaching_36_42: Option<bool>,
    #[serde(default)]
    pub coaching_43_49: Option<bool>,
    #[serde(default)]
    pub coaching_50_56: Option<bool>,
    #[serde(default)]
    pub coaching_57_63: Option<bool>,
    #[serde(default)]
    pub coaching_64_70: Option<bool>,
    #[serde(default)]
    pub coaching_71_77: Option<bool>,
    #[serde(default)]
    pub coaching_78_84: Option<bool>,

    // Provider engagement, by day band
    #[serde(default)]
    pub engagement_00_07: Option<bool>,
    #[serde(default)]
    pub engagement_08_14: Option<bool>,
    #[serde(default)]
    pub engagement_15_21: Option<bool>,
    #[serde(default)]
    pub engagement_22_28: Option<bool>,
    #[serde(default)]
    pub engagement_29_35: Option<bool>,
    #[serde(default)]
    pub engagement_36_42: Option<bool>,
    #[serde(default)]
    pub engagement_43_49: Option<bool>,
    #[serde(default)]
    pub engagement_50_56: Option<bool>,
    #[serde(default)]
    pub engagement_57_63: Option<bool>,
    #[serde(default)]
    pub engagement_64_70: Option<bool>,
    #[serde(default)]
    pub engagement_71_77: Option<bool>,
    #[serde(default)]
    pub engagement_78_84: Option<bool>,

    // Weight measurements, by day band
    #[serde(default)]
    pub weight_00_07: Option<Measurement>,
    #[serde(default)]
    pub weight_08_14: Option<Measurement>,
    #[serde(default)]
    pub weight_15_21: Option<Measurement>,
    #[serde(default)]
    pub weight_22_28: Option<Measurement>,
    #[serde(default)]
    pub weight_29_35: Option<Measurement>,
    #[serde(default)]
    pub weight_36_42: Option<Measurement>,
    #[serde(default)]
    pub weight_43_49: Option<Measurement>,
    #[serde(default)]
    pub weight_50_56: Option<Measurement>,
    #[serde(default)]
    pub weight_57_63: Option<Measurement>,
    #[serde(default)]
    pub weight_64_70: Option<Measurement>,
    #[serde(default)]
    pub weight_71_77: Option<Measurement>,
    #[serde(default)]
    pub weight_78_84: Option<Measurement>,
    #[serde(default)]
    pub weight_85_plus: Option<Measurement>,
}

impl ExtractRow {
    /// Coaching flags in `DAY_BANDS` order.
    pub fn coaching(&self) -> [Option<bool>; 12] {
        [
            self.coaching_00_07,
            self.coaching_08_14,
            self.coaching_15_21,
            self.coaching_22_28,
            self.coaching_29_35,
            self.coaching_36_42,
            self.coaching_43_49,
            self.coaching_50_56,
            self.coaching_57_63,
            self.coaching_64_70,
            self.coaching_71_77,
            self.coaching_78_84,
        ]
    }

    /// Provider engagement flags in `DAY_BANDS` order.
    pub fn engagement(&self) -> [Option<bool>; 12] {
        [
            self.engagement_00_07,
            self.engagement_08_14,
            self.engagement_15_21,
            self.engagement_22_28,
            self.engagement_29_35,
            self.engagement_36_42,
            self.engagement_43_49,
            self.engagement_50_56,
            self.engagement_57_63,
            self.engagement_64_70,
            self.engagement_71_77,
            self.engagement_78_84,
        ]
    }

    /// Weight measurements in `DAY_BANDS` order. The 85+ band is separate.
    pub fn weights(&self) -> [Option<&Measurement>; 12] {
        [
            self.weight_00_07.as_ref(),
            self.weight_08_14.as_ref(),
            self.weight_15_21.as_ref(),
            self.weight_22_28.as_ref(),
            self.weight_29_35.as_ref(),
            self.weight_36_42.as_ref(),
            self.weight_43_49.as_ref(),
            self.weight_50_56.as_ref(),
            self.weight_57_63.as_ref(),
            self.weight_64_70.as_ref(),
            self.weight_71_77.as_ref(),
            self.weight_78_84.as_ref(),
        ]
    }
}

/// Rows returned for one extract window, in API order.
pub type ExtractBatch = Vec<ExtractRow>;
