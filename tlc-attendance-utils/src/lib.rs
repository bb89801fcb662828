pub mod credentials;
pub mod fs_ini_util;
