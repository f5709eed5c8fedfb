use std::path::Path;

use anyhow::{Context as _, bail};

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, the TOML is malformed, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// `{{ env.VAR }}` placeholders are expanded before parsing and the
    /// result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;
        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_openai()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_openai(&self) -> anyhow::Result<()> {
        let openai = &self.openai;

        if openai.model.trim().is_empty() {
            bail!("openai.model must not be empty");
        }

        if let Some(temperature) = openai.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            bail!("openai.temperature must be between 0.0 and 2.0, got {temperature}");
        }

        if let Some(timeout) = openai.timeout()?
            && timeout.is_zero()
        {
            bail!("openai.timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_telemetry(&self) -> anyhow::Result<()> {
        let Some(ref telemetry) = self.telemetry else {
            return Ok(());
        };

        if telemetry.service_name.trim().is_empty() {
            bail!("telemetry.service_name must not be empty");
        }

        if let Some(ref tracing) = telemetry.tracing
            && !(0.0..=1.0).contains(&tracing.sampling_rate)
        {
            bail!(
                "telemetry.tracing.sampling_rate must be between 0.0 and 1.0, got {}",
                tracing.sampling_rate
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::telemetry::exporters::ExportProtocol;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert!(config.openai.api_key.is_none());
        assert!(config.openai.base_url.is_none());
        assert!(config.openai.timeout().unwrap().is_none());
        assert!(config.telemetry.is_none());
    }

    #[test]
    fn full_config() {
        let raw = r#"
            [openai]
            api_key = "sk-test"
            base_url = "http://localhost:8080/v1"
            model = "gpt-4o"
            temperature = 0.7
            timeout = "90s"

            [telemetry]
            service_name = "conduit-test"

            [telemetry.exporter]
            endpoint = "http://localhost:4318"
            protocol = "http_proto"

            [telemetry.tracing]
            sampling_rate = 0.25
            parent_based = false
        "#;

        let config = Config::parse(raw).unwrap();

        let openai = &config.openai;
        assert_eq!(openai.api_key.as_ref().unwrap().expose_secret(), "sk-test");
        assert_eq!(openai.base_url.as_ref().map(url::Url::as_str), Some("http://localhost:8080/v1"));
        assert_eq!(openai.model, "gpt-4o");
        assert_eq!(openai.temperature, Some(0.7));
        assert_eq!(openai.timeout().unwrap(), Some(Duration::from_secs(90)));

        let telemetry = config.telemetry.unwrap();
        assert_eq!(telemetry.service_name, "conduit-test");
        let exporter = telemetry.trace_exporter().unwrap();
        assert_eq!(exporter.protocol, ExportProtocol::HttpProto);
        let tracing = telemetry.tracing.unwrap();
        assert!((tracing.sampling_rate - 0.25).abs() < f64::EPSILON);
        assert!(!tracing.parent_based);
    }

    #[test]
    fn api_key_from_environment() {
        temp_env::with_var("CONDUIT_TEST_OPENAI_KEY", Some("sk-from-env"), || {
            let config = Config::parse("[openai]\napi_key = \"{{ env.CONDUIT_TEST_OPENAI_KEY }}\"\n").unwrap();
            assert_eq!(config.openai.api_key.as_ref().unwrap().expose_secret(), "sk-from-env");
        });
    }

    #[test]
    fn tracing_exporter_overrides_default() {
        let raw = r#"
            [telemetry.exporter]
            endpoint = "http://default:4317"

            [telemetry.tracing.exporter]
            endpoint = "http://traces:4317"
        "#;

        let config = Config::parse(raw).unwrap();
        let telemetry = config.telemetry.unwrap();
        assert_eq!(telemetry.service_name, "conduit");
        assert_eq!(telemetry.trace_exporter().unwrap().endpoint.as_str(), "http://traces:4317/");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::parse("[openai]\nmodle = \"gpt-4o\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("modle"));
    }

    #[test]
    fn temperature_out_of_range() {
        let err = Config::parse("[openai]\ntemperature = 2.5\n").unwrap_err();
        assert!(err.to_string().contains("openai.temperature"));
    }

    #[test]
    fn empty_model() {
        let err = Config::parse("[openai]\nmodel = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("openai.model"));
    }

    #[test]
    fn invalid_timeout() {
        let err = Config::parse("[openai]\ntimeout = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("openai.timeout"));

        let err = Config::parse("[openai]\ntimeout = \"0s\"\n").unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn sampling_rate_out_of_range() {
        let err = Config::parse("[telemetry.tracing]\nsampling_rate = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("sampling_rate"));
    }

    #[test]
    fn missing_file() {
        let err = Config::load(Path::new("/nonexistent/conduit.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
