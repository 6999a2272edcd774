//! Form fields and their allowed values.
//!
//! The domains below are the choices a student form offers. They are handed
//! to [`FormSchema`] explicitly so callers and tests can swap them out.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{PredictError, Result};
use crate::models::{StudentRecord, Value};

/// Categorical field whose choices are raw values rather than coded labels.
pub const APPLICATION_ORDER: &str = "Application_order";

const APPLICATION_MODE: &[&str] = &[
    "1 - 1st phase - general contingent",
    "2 - Ordinance No. 612/93",
    "5 - 1st phase - special contingent (Azores Island)",
    "7 - Holders of other higher courses",
    "10 - Ordinance No. 854-B/99",
    "15 - International student (bachelor)",
    "16 - 1st phase - special contingent (Madeira Island)",
    "17 - 2nd phase - general contingent",
    "18 - 3rd phase - general contingent",
    "26 - Ordinance No. 533-A/99, item b2) (Different Plan)",
    "27 - Ordinance No. 533-A/99, item b3 (Other Institution)",
    "39 - Over 23 years old",
    "42 - Transfer",
    "43 - Change of course",
    "44 - Technological specialization diploma holders",
    "51 - Change of institution/course",
    "53 - Short cycle diploma holders",
    "57 - Change of institution/course (International)",
];

const COURSE: &[&str] = &[
    "33 - Biofuel Production Technologies",
    "171 - Animation and Multimedia Design",
    "8014 - Social Service (evening attendance)",
    "9003 - Agronomy",
    "9070 - Communication Design",
    "9085 - Veterinary Nursing",
    "9119 - Informatics Engineering",
    "9130 - Equinculture",
    "9147 - Management",
    "9238 - Social Service",
    "9254 - Tourism",
    "9500 - Nursing",
    "9556 - Oral Hygiene",
    "9670 - Advertising and Marketing Management",
    "9773 - Journalism and Communication",
    "9853 - Basic Education",
    "9991 - Management (evening attendance)",
];

const PREVIOUS_QUALIFICATION: &[&str] = &[
    "1 - Secondary education",
    "2 - Higher education - bachelor's degree",
    "3 - Higher education - degree",
    "4 - Higher education - master's",
    "5 - Higher education - doctorate",
    "6 - Frequency of higher education",
    "9 - 12th year of schooling - not completed",
    "10 - 11th year of schooling - not completed",
    "12 - Other - 11th year of schooling",
    "14 - 10th year of schooling",
    "15 - 10th year of schooling - not completed",
    "19 - Basic education 3rd cycle (9th/10th/11th year) or equiv.",
    "38 - Basic education 2nd cycle (6th/7th/8th year) or equiv.",
    "39 - Technological specialization course",
    "40 - Higher education - degree (1st cycle)",
    "42 - Professional higher technical course",
    "43 - Higher education - master (2nd cycle)",
];

const MOTHER_QUALIFICATION: &[&str] = &[
    "1 - Secondary Education - 12th Year of Schooling or Eq.",
    "2 - Higher Education - Bachelor's Degree",
    "3 - Higher Education - Degree",
    "4 - Higher Education - Master's",
    "5 - Higher Education - Doctorate",
    "6 - Frequency of Higher Education",
    "9 - 12th Year of Schooling - Not Completed",
    "10 - 11th Year of Schooling - Not Completed",
    "11 - 7th Year (Old)",
    "12 - Other - 11th Year of Schooling",
    "14 - 10th Year of Schooling",
    "18 - General commerce course",
    "19 - Basic Education 3rd Cycle (9th/10th/11th Year) or Equiv.",
    "22 - Technical-professional course",
    "26 - 7th year of schooling",
    "27 - 2nd cycle of the general high school course",
    "29 - 9th Year of Schooling - Not Completed",
    "30 - 8th year of schooling",
    "34 - Unknown",
    "35 - Can't read or write",
    "36 - Can read without having a 4th year of schooling",
    "37 - Basic education 1st cycle (4th/5th year) or equiv.",
    "38 - Basic Education 2nd Cycle (6th/7th/8th Year) or Equiv.",
    "39 - Technological specialization course",
    "40 - Higher education - degree (1st cycle)",
    "41 - Specialized higher studies course",
    "42 - Professional higher technical course",
    "43 - Higher Education - Master (2nd cycle)",
    "44 - Higher Education - Doctorate (3rd cycle)",
];

const FATHER_QUALIFICATION: &[&str] = &[
    "1 - Secondary Education - 12th Year of Schooling or Eq.",
    "2 - Higher Education - Bachelor's Degree",
    "3 - Higher Education - Degree",
    "4 - Higher Education - Master's",
    "5 - Higher Education - Doctorate",
    "6 - Frequency of Higher Education",
    "9 - 12th Year of Schooling - Not Completed",
    "10 - 11th Year of Schooling - Not Completed",
    "11 - 7th Year (Old)",
    "12 - Other - 11th Year of Schooling",
    "13 - 2nd year complementary high school course",
    "14 - 10th Year of Schooling",
    "18 - General commerce course",
    "19 - Basic Education 3rd Cycle (9th/10th/11th Year) or Equiv.",
    "20 - Complementary High School Course",
    "22 - Technical-professional course",
    "25 - Complementary High School Course - not concluded",
    "26 - 7th year of schooling",
    "27 - 2nd cycle of the general high school course",
    "29 - 9th Year of Schooling - Not Completed",
    "30 - 8th year of schooling",
    "31 - General Course of Administration and Commerce",
    "33 - Supplementary Accounting and Administration",
    "34 - Unknown",
    "35 - Can't read or write",
    "36 - Can read without having a 4th year of schooling",
    "37 - Basic education 1st cycle (4th/5th year) or equiv.",
    "38 - Basic Education 2nd Cycle (6th/7th/8th Year) or Equiv.",
    "39 - Technological specialization course",
    "40 - Higher education - degree (1st cycle)",
    "41 - Specialized higher studies course",
    "42 - Professional higher technical course",
    "43 - Higher Education - Master (2nd cycle)",
    "44 - Higher Education - Doctorate (3rd cycle)",
];

const MOTHER_OCCUPATION: &[&str] = &[
    "0 - Student",
    "1 - Legislative/Executive/Directors",
    "2 - Intellectual/Scientific Activities",
    "3 - Intermediate Level Technicians",
    "4 - Administrative staff",
    "5 - Services/Sellers/Security",
    "6 - Farmers and Agriculture workers",
    "7 - Industry/Construction/Craftsmen",
    "8 - Machine Operators",
    "9 - Unskilled Workers",
    "10 - Armed Forces",
    "90 - Other Situation",
    "99 - (blank)",
    "122 - Health professionals",
    "123 - Teachers",
    "125 - ICT Specialists",
    "131 - Engineering/Science Technicians",
    "132 - Health Technicians",
    "134 - Legal/Social/Sports/Cultural Technicians",
    "141 - Office/Data Processing",
    "143 - Financial/Registry Operators",
    "144 - Other Admin Staff",
    "151 - Personal Service Workers",
    "152 - Sellers",
    "153 - Personal Care Workers",
    "171 - Skilled Construction Workers",
    "173 - Artisans/Precision Workers",
    "175 - Food/Wood/Textile Craftsmen",
    "191 - Cleaning Workers",
    "192 - Unskilled Agriculture/Fishery",
    "193 - Unskilled Construction/Transport",
    "194 - Meal Prep Assistants",
];

const FATHER_OCCUPATION: &[&str] = &[
    "0 - Student",
    "1 - Legislative/Executive/Directors",
    "2 - Intellectual/Scientific Activities",
    "3 - Intermediate Level Technicians",
    "4 - Administrative staff",
    "5 - Services/Sellers/Security",
    "6 - Farmers and Agriculture workers",
    "7 - Industry/Construction/Craftsmen",
    "8 - Machine Operators",
    "9 - Unskilled Workers",
    "10 - Armed Forces",
    "90 - Other Situation",
    "99 - (blank)",
    "101 - Armed Forces Officers",
    "102 - Armed Forces Sergeants",
    "103 - Armed Forces personnel",
    "112 - Admin/Commercial Directors",
    "114 - Services Directors",
    "121 - Engineering/Math/Science Specialists",
    "122 - Health professionals",
    "123 - Teachers",
    "124 - Finance/Admin Specialists",
    "131 - Science/Engineering Technicians",
    "132 - Health Technicians",
    "134 - Legal/Social/Cultural Technicians",
    "135 - ICT Technicians",
    "141 - Office/Data Processing",
    "143 - Financial/Registry Operators",
    "144 - Other Admin Staff",
    "151 - Personal Service Workers",
    "152 - Sellers",
    "153 - Personal Care Workers",
    "154 - Protection/Security Staff",
    "161 - Market-Oriented Farmers",
    "163 - Subsistence Farmers/Fishers",
    "171 - Skilled Construction Workers",
    "172 - Metal/Mechanical Workers",
    "174 - Electric/Electronic Workers",
    "175 - Food/Wood/Textile Craftsmen",
    "181 - Plant/Machine Operators",
    "182 - Assembly Workers",
    "183 - Vehicle Drivers",
    "192 - Unskilled Agriculture Workers",
    "193 - Unskilled Construction/Transport",
    "194 - Meal Prep Assistants",
    "195 - Street Vendors",
];

const APPLICATION_ORDER_CHOICES: &[&str] = &[
    "0",
    "1",
    "2",
    "3",
    "4",
    "5",
    "6",
    "7",
    "8",
    "9",
];

const DAYTIME_EVENING_ATTENDANCE: &[&str] = &[
    "1 - Daytime",
    "0 - Evening",
];

const DISPLACED: &[&str] = &[
    "1 - Yes",
    "0 - No",
];

const DEBTOR: &[&str] = &[
    "1 - Yes",
    "0 - No",
];

const TUITION_FEES_UP_TO_DATE: &[&str] = &[
    "1 - Yes",
    "0 - No",
];

const GENDER: &[&str] = &[
    "1 - Male",
    "0 - Female",
];

const SCHOLARSHIP_HOLDER: &[&str] = &[
    "1 - Yes",
    "0 - No",
];

const NUMERICAL_FIELDS: &[&str] = &[
    "Previous_qualification_grade",
    "Admission_grade",
    "Age",
    "Curricular_units_1st_sem_credited",
    "Curricular_units_1st_sem_enrolled",
    "Curricular_units_1st_sem_evaluations",
    "Curricular_units_1st_sem_approved",
    "Curricular_units_1st_sem_grade",
    "Curricular_units_1st_sem_without_evaluations",
    "Curricular_units_2nd_sem_credited",
    "Curricular_units_2nd_sem_enrolled",
    "Curricular_units_2nd_sem_evaluations",
    "Curricular_units_2nd_sem_approved",
    "Curricular_units_2nd_sem_grade",
    "Curricular_units_2nd_sem_without_evaluations",
    "Unemployment_rate",
    "GDP",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalField {
    pub name: String,
    /// `"<code> - <label>"` strings, or bare values for raw fields.
    pub choices: Vec<String>,
    /// Stored as the submitted text instead of an integer code.
    pub raw: bool,
}

impl CategoricalField {
    pub fn coded(name: &str, choices: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
            raw: false,
        }
    }

    pub fn raw(name: &str, choices: &[&str]) -> Self {
        Self {
            raw: true,
            ..Self::coded(name, choices)
        }
    }

    fn accepts_code(&self, code: i64) -> bool {
        self.choices
            .iter()
            .any(|choice| leading_code(choice) == Some(code))
    }

    fn parse(&self, raw: &str) -> Result<Value> {
        if self.raw {
            let value = raw.trim();
            if value.is_empty() {
                return Err(PredictError::invalid_input(&self.name, "no value selected"));
            }
            return Ok(Value::Text(value.to_string()));
        }

        let code = parse_code(&self.name, raw)?;
        if !self.accepts_code(code) {
            return Err(PredictError::invalid_input(
                &self.name,
                format!("code {code} is not one of the allowed choices"),
            ));
        }
        Ok(Value::Code(code))
    }
}

/// The full set of fields a submission must provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSchema {
    pub categorical: Vec<CategoricalField>,
    pub numerical: Vec<String>,
}

impl FormSchema {
    pub fn student_default() -> Self {
        let coded = [
            ("Application_mode", APPLICATION_MODE),
            ("Course", COURSE),
            ("Previous_qualification", PREVIOUS_QUALIFICATION),
            ("Mother_qualification", MOTHER_QUALIFICATION),
            ("Father_qualification", FATHER_QUALIFICATION),
            ("Mother_occupation", MOTHER_OCCUPATION),
            ("Father_occupation", FATHER_OCCUPATION),
        ];
        let binary = [
            ("Daytime/evening_attendance", DAYTIME_EVENING_ATTENDANCE),
            ("Displaced", DISPLACED),
            ("Debtor", DEBTOR),
            ("Tuition_fees_up_to_date", TUITION_FEES_UP_TO_DATE),
            ("Gender", GENDER),
            ("Scholarship_holder", SCHOLARSHIP_HOLDER),
        ];

        let mut categorical: Vec<CategoricalField> = coded
            .iter()
            .map(|(name, choices)| CategoricalField::coded(name, choices))
            .collect();
        categorical.push(CategoricalField::raw(APPLICATION_ORDER, APPLICATION_ORDER_CHOICES));
        categorical.extend(
            binary
                .iter()
                .map(|(name, choices)| CategoricalField::coded(name, choices)),
        );

        Self {
            categorical,
            numerical: NUMERICAL_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn categorical_field(&self, name: &str) -> Option<&CategoricalField> {
        self.categorical.iter().find(|field| field.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.categorical.len() + self.numerical.len()
    }

    /// Validates raw form text into a [`StudentRecord`].
    ///
    /// Categorical fields are checked first, then numerical ones, each in
    /// schema order; the first bad field is reported.
    pub fn parse(&self, form: &HashMap<String, String>) -> Result<StudentRecord> {
        let mut record = StudentRecord::new();

        for field in &self.categorical {
            let raw = form
                .get(&field.name)
                .ok_or_else(|| PredictError::invalid_input(&field.name, "field is missing"))?;
            record.insert(&field.name, field.parse(raw)?);
        }

        for name in &self.numerical {
            let raw = form
                .get(name)
                .ok_or_else(|| PredictError::invalid_input(name, "field is missing"))?;
            let value: f64 = raw.trim().parse().map_err(|_| {
                PredictError::invalid_input(name, format!("'{}' is not a number", raw.trim()))
            })?;
            if !value.is_finite() {
                return Err(PredictError::invalid_input(name, "value must be finite"));
            }
            record.insert(name, Value::Number(value));
        }

        for key in form.keys() {
            if self.categorical_field(key).is_none() && !self.numerical.contains(key) {
                debug!(field = %key, "ignoring unknown form field");
            }
        }

        Ok(record)
    }
}

/// Extracts the integer code from a `"<code> - <label>"` choice.
pub fn parse_code(field: &str, raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PredictError::invalid_input(field, "no value selected"));
    }
    leading_code(raw).ok_or_else(|| {
        PredictError::invalid_input(field, format!("'{raw}' does not start with an integer code"))
    })
}

fn leading_code(choice: &str) -> Option<i64> {
    choice.split(" - ").next()?.trim().parse().ok()
}
