pub const CONFIG_VAR: &str = "ELLA_RS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "ella.toml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";
pub const MAX_FORM_LENGTH: usize = 1024 * 256;
pub const SESSION_COOKIE: &str = "sessionid";
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const MENU_ITEMS: &[(&str, &str)] = &[("Interviews", "/interviews/")];
pub const UNKNOWN_IP_ADDRESS: &str = "0.0.0.0";
