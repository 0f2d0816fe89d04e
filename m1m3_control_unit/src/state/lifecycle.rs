//! States outside the enabled family.

use m1m3_common::fault::PowerNetworks;
use m1m3_common::state::DetailedState::{self, *};
use tracing::{error, info};

use super::{StateError, Transition};
use crate::command::Command;
use crate::model::Model;

pub(super) fn handle(model: &mut Model, state: DetailedState, command: &Command) -> Transition {
    match (state, command) {
        (Offline | Standby, Command::Update) => Ok(None),
        (Disabled | Fault, Command::Update) => {
            model.telemetry_update();
            Ok(None)
        }

        (Offline, Command::Boot) => Ok(Some(Standby)),

        (Standby, Command::Start(p)) => {
            let settings = model.load_settings(&p.settings_to_apply)?;
            model.apply_settings(settings);
            model.turn_power_on(PowerNetworks::MAIN)?;
            Ok(Some(Disabled))
        }
        (Standby, Command::Shutdown) => Ok(Some(Offline)),

        (Disabled, Command::Enable) => {
            model.force.reset();
            model.turn_air_on()?;
            model.turn_power_on(PowerNetworks::AUX)?;
            Ok(Some(Parked))
        }
        (Disabled, Command::Standby) => {
            model.turn_everything_off()?;
            Ok(Some(Standby))
        }
        (Disabled, Command::ProgramIlc(p)) => {
            model.program_ilc(p.actuator_id, &p.file_path)?;
            Ok(None)
        }
        (Disabled, Command::ModbusTransmit(p)) => {
            model.modbus_transmit(p.actuator_id, p.function_code, &p.data)?;
            Ok(None)
        }
        (Disabled, Command::Panic) => {
            model.safety.user_panic();
            Ok(None)
        }

        (LoweringFault, Command::Update) => {
            error!("Removing all mirror forces after fault");
            model.zero_all_forces();
            model.enabled_update();
            Ok(Some(Fault))
        }

        (Fault, Command::Standby) => {
            info!("Leaving fault");
            model.safety.clear_error_code();
            model.turn_everything_off()?;
            Ok(Some(Standby))
        }

        _ => Err(StateError::not_valid(command, state)),
    }
}
