pub mod backup_config;
pub mod capture;
pub mod compress;
pub mod executor;
pub mod file_ext;
pub mod finish;
pub mod hooks;
pub mod naming;
pub mod orchestrator;
pub mod result_error;
pub mod retention;
pub mod shell;
pub mod tar;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
