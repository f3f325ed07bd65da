//! Static configuration: app aliases, prompts and UI strings.

mod apps;
mod i18n;
mod prompts;

pub use apps::{
    alias_for_package, aliases_for_package, package_for_alias, supported_apps, PACKAGE_ALIASES,
};
pub use i18n::{get_messages, Messages};
pub use prompts::{
    format_datetime, get_system_prompt, render_prompt, render_prompt_at, system_prompt_template,
    DATETIME_PLACEHOLDER,
};
