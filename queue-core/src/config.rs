use config_validator::EnvReader;

pub struct AppConfig {
    pub database_url: String,
    pub health_port: u16,
    pub worker_count: u32,
    pub lease_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut r = EnvReader::from_env();

        let database_url: Option<String> = r.required("DATABASE_URL");
        let health_port: u16 = r.optional("HEALTH_PORT", 8081);
        let worker_count: u32 = r.optional("WORKER_COUNT", 4);
        let lease_seconds: u64 = r.optional("LEASE_SECONDS", 30);

        if let Err(e) = r.finish() {
            panic!("{e}");
        }

        Self {
            database_url: database_url.expect("validated above"),
            health_port,
            worker_count,
            lease_seconds,
        }
    }
}
