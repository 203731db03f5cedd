use rocket::figment::Figment;
use rocket::{catchers, routes, Build, Rocket};

use crate::api::{default_catcher, generate};
use crate::app_state::AppState;
use crate::config::Settings;
use crate::fairing::RequestTrace;

/// Rocket 自己的日志关掉，统一走 tracing
pub fn server_figment(settings: &Settings) -> Figment {
    rocket::Config::figment()
        .merge(("port", settings.port))
        .merge(("address", settings.host.as_str()))
        .merge(("log_level", "off"))
}

pub fn build_rocket(state: AppState, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(RequestTrace)
        .manage(state)
        .mount("/", routes![generate])
        .register("/", catchers![default_catcher])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rocket::config::LogLevel;

    use crate::config::CliArgs;

    #[test]
    fn figment_carries_port_and_address() {
        let args =
            CliArgs::try_parse_from(["minivault", "--port", "9191", "--host", "127.0.0.1"]).unwrap();
        let settings = Settings::from_args(args).unwrap();

        let config: rocket::Config = server_figment(&settings).extract().unwrap();
        assert_eq!(config.port, 9191);
        assert_eq!(config.address.to_string(), "127.0.0.1");
        assert_eq!(config.log_level, LogLevel::Off);
    }
}
