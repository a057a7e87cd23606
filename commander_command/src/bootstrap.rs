//! Startup address push.
//!
//! Once the link is up the marshaller is told which transport address
//! belongs to which component: one `"<keyword>=<address>"` value per
//! paired component, in keyword order.

use commander_common::component::{ComponentDirectory, ComponentKeyword};
use tracing::{info, warn};

use crate::interpreter::{CommandError, CommandInterpreter};

/// Private command carrying the address table.
pub const BOOTSTRAP_COMMAND: &str = "set_axis_mac_ids";

/// The address table goes to the marshaller itself.
pub const BOOTSTRAP_AXIS: ComponentKeyword = ComponentKeyword::M;

/// Parameter values for the address push.
pub fn bootstrap_params(directory: &dyn ComponentDirectory) -> Vec<String> {
    directory
        .keywords()
        .into_iter()
        .filter_map(|kw| directory.address(kw).map(|addr| format!("{kw}={addr}")))
        .collect()
}

/// Send the address table through `interpreter`. Non-blocking.
pub fn send_bootstrap(
    interpreter: &CommandInterpreter,
    directory: &dyn ComponentDirectory,
) -> Result<usize, CommandError> {
    let params = bootstrap_params(directory);
    if params.is_empty() {
        warn!("Component directory is empty; sending an empty address table");
    } else {
        info!("Pushing {} component address(es) to the marshaller", params.len());
    }
    interpreter.send_system(BOOTSTRAP_COMMAND, BOOTSTRAP_AXIS.as_str(), &params, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_common::component::JsonComponentStore;

    #[test]
    fn test_params_in_keyword_order() {
        let dir = JsonComponentStore::from_addresses([
            (ComponentKeyword::Y, "bb:bb:bb:bb:bb:bb"),
            (ComponentKeyword::M, "aa:aa:aa:aa:aa:aa"),
        ]);
        assert_eq!(
            bootstrap_params(&dir),
            vec!["m=aa:aa:aa:aa:aa:aa", "y=bb:bb:bb:bb:bb:bb"]
        );
    }
}
