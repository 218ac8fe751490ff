const CASES_VAR: &str = "PROPTEST_CASES";

/// Case count for property tests, overridable through `PROPTEST_CASES`.
pub fn cases() -> u32 {
    std::env::var(CASES_VAR)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(100)
}
