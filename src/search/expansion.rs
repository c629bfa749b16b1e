//! Lay-term to clinical-term query expansion.

const MEDICAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("heart attack", &["myocardial infarction", "cardiac arrest"]),
    ("high blood pressure", &["hypertension"]),
    ("sugar", &["glucose", "diabetes"]),
    ("flu", &["influenza"]),
    ("cold", &["common cold", "rhinitis"]),
    ("headache", &["migraine", "cephalgia"]),
    ("stomach pain", &["abdominal pain", "gastric pain"]),
    ("fever", &["pyrexia", "high temperature"]),
];

/// Append the first synonym of the first table term found in the query.
/// At most one term is expanded; substring matching, like entity extraction.
pub fn expand_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    MEDICAL_SYNONYMS
        .iter()
        .find(|(term, _)| lowered.contains(term))
        .and_then(|(_, synonyms)| synonyms.first())
        .map(|synonym| format!("{query} {synonym}"))
        .unwrap_or_else(|| query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expands_first_match_only() {
        assert_eq!(
            expand_query("High blood pressure and headache"),
            "High blood pressure and headache hypertension"
        );
    }

    #[test]
    fn test_table_order_decides() {
        // "heart attack" precedes "fever" in the table
        assert_eq!(
            expand_query("fever after a heart attack"),
            "fever after a heart attack myocardial infarction"
        );
    }

    #[test]
    fn test_no_match_is_unchanged() {
        assert_eq!(expand_query("knee injury"), "knee injury");
    }
}
