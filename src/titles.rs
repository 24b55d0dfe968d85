use regex::Regex;
use std::sync::LazyLock;

pub const OTHER: &str = "Other";

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[].*?[\)\]]").expect("static pattern"));
static NON_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z\s]").expect("static pattern"));
static FLUFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(senior|sr|junior|jr|lead|principal|staff|early career|entry level|mid level|level|ii|iii|iv)\b",
    )
    .expect("static pattern")
});
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Buckets a free-text role into a broad category. Software roles collapse
/// into a handful of buckets; anything else keeps a cleaned, title-cased name.
pub fn normalize_role(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return OTHER.to_string();
    }

    let t = BRACKETED.replace_all(&lower, " ");
    let t = NON_LETTERS.replace_all(&t, " ");
    let t = FLUFF.replace_all(&t, " ");
    let t = SPACES.replace_all(&t, " ");
    let t = t.trim();

    let has = |needle: &str| t.contains(needle);
    let engineer_or_dev = has("engineer") || has("developer");

    if has("full stack") && engineer_or_dev {
        return "Full Stack Developer".to_string();
    }
    if has("front end") || has("frontend") || has("ui engineer") {
        return "Front End Developer".to_string();
    }
    if has("back end") || has("backend") {
        return "Back End Developer".to_string();
    }
    if has("web") && has("developer") {
        return "Web Developer".to_string();
    }
    if engineer_or_dev && !has("data") {
        return "Software Engineer/Developer".to_string();
    }
    if has("data") && (has("engineer") || has("scientist") || has("analyst")) {
        return "Data / Analytics".to_string();
    }

    if t.is_empty() {
        return OTHER.to_string();
    }
    title_case(t)
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_software_roles() {
        assert_eq!(normalize_role("Senior Software Engineer II"), "Software Engineer/Developer");
        assert_eq!(normalize_role("Sr. Full-Stack Developer (.NET/Azure)"), "Full Stack Developer");
        assert_eq!(normalize_role("Frontend Engineer"), "Front End Developer");
        assert_eq!(normalize_role("Lead Backend Developer [Remote]"), "Back End Developer");
        assert_eq!(normalize_role("Junior Web Developer"), "Web Developer");
        assert_eq!(normalize_role("Platform Engineer"), "Software Engineer/Developer");
    }

    #[test]
    fn buckets_data_roles() {
        assert_eq!(normalize_role("Staff Data Scientist"), "Data / Analytics");
        assert_eq!(normalize_role("Data Engineer"), "Data / Analytics");
    }

    #[test]
    fn keeps_cleaned_non_software_titles() {
        assert_eq!(normalize_role("  senior marketing manager "), "Marketing Manager");
        assert_eq!(normalize_role("Product Designer (contract)"), "Product Designer");
    }

    #[test]
    fn fluff_is_only_stripped_as_whole_words() {
        // "staffing" and "leader" must survive.
        assert_eq!(normalize_role("Staffing Coordinator"), "Staffing Coordinator");
        assert_eq!(normalize_role("Team Leader"), "Team Leader");
    }

    #[test]
    fn empty_or_pure_fluff_is_other() {
        assert_eq!(normalize_role(""), OTHER);
        assert_eq!(normalize_role("   "), OTHER);
        assert_eq!(normalize_role("Senior (Remote)"), OTHER);
    }
}
