pub const RECOVERY_OD_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const RECOVERY_OD_BUILD_N: &str = env!("RECOVERY_OD_BUILD_N");

pub fn version_text() -> String {
    format!("{RECOVERY_OD_VERSION}+{RECOVERY_OD_BUILD_N}")
}

pub fn version_cli_text() -> String {
    format!(
        "recovery_od {}\nBuild {}\nBlank-baselined OD extinction calls for coculture recovery plates",
        RECOVERY_OD_VERSION, RECOVERY_OD_BUILD_N
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_text_carries_build_number() {
        assert!(version_text().starts_with(RECOVERY_OD_VERSION));
        assert!(version_cli_text().contains(&format!("Build {RECOVERY_OD_BUILD_N}")));
    }
}
