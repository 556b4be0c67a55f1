mod submit_wizard;

pub use submit_wizard::{run_submit_wizard, SubmitArgs};
