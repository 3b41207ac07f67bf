use crate::phone::validate_phone;
use std::collections::HashMap;

/// One parsed CSV row, phone-validated but not yet assigned to a template or
/// a campaign. `outreach-orchestration` turns these into `CampaignContact`
/// rows once it knows the owning campaign id and the round-robin template
/// assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContact {
    pub phone: String,
    pub variables: HashMap<String, String>,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
}

/// Parse the CSV body per the format in §6: first column recipient phone,
/// remaining columns named template variables, empty rows ignored.
pub fn parse_contacts(
    csv_bytes: &[u8],
    country_prefix: &str,
    total_digits: usize,
) -> anyhow::Result<Vec<ParsedContact>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_bytes);

    let headers = reader.headers()?.clone();
    let variable_names: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let raw_phone = record.get(0).unwrap_or("").trim().to_string();
        if raw_phone.is_empty() {
            continue;
        }

        let mut variables = HashMap::new();
        for (idx, name) in variable_names.iter().enumerate() {
            if let Some(value) = record.get(idx + 1) {
                variables.insert(name.clone(), value.to_string());
            }
        }

        match validate_phone(&raw_phone, country_prefix, total_digits) {
            Ok(normalized) => out.push(ParsedContact {
                phone: normalized,
                variables,
                is_valid: true,
                invalid_reason: None,
            }),
            Err(e) => out.push(ParsedContact {
                phone: raw_phone,
                variables,
                is_valid: false,
                invalid_reason: Some(e.to_string()),
            }),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_literal_scenario_2() {
        let csv = "phone,name\n919876543210,Asha\n9198765,Bee\n12345678901234,Cee\n19876543210,Dee\n";
        let contacts = parse_contacts(csv.as_bytes(), "91", 12).unwrap();
        assert_eq!(contacts.len(), 4);
        assert!(contacts[0].is_valid);
        assert_eq!(contacts[0].phone, "919876543210");

        let invalid: Vec<&ParsedContact> = contacts.iter().filter(|c| !c.is_valid).collect();
        assert_eq!(invalid.len(), 3);
        let reasons: std::collections::HashSet<&str> =
            invalid.iter().map(|c| c.invalid_reason.as_deref().unwrap()).collect();
        assert_eq!(reasons.len(), 3, "each invalid row has a distinct reason");
    }

    #[test]
    fn ignores_blank_rows() {
        let csv = "phone,name\n919876543210,Asha\n,\n";
        let contacts = parse_contacts(csv.as_bytes(), "91", 12).unwrap();
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn captures_named_variables() {
        let csv = "phone,first_name,coupon\n919876543210,Asha,SAVE10\n";
        let contacts = parse_contacts(csv.as_bytes(), "91", 12).unwrap();
        assert_eq!(contacts[0].variables.get("first_name").unwrap(), "Asha");
        assert_eq!(contacts[0].variables.get("coupon").unwrap(), "SAVE10");
    }
}
