//! Enabled-family states: Parked, Raising, Active, Lowering and their
//! engineering variants.
//!
//! Acceptance widens with the state: Active adds the optical corrections,
//! the engineering variants add offsets, hardpoint motion and cell I/O,
//! ActiveEngineering adds rigid-body moves and PID tuning.

use m1m3_common::fault::PowerNetworks;
use m1m3_common::state::DetailedState::{self, *};
use tracing::info;

use super::{StateError, Transition};
use crate::command::Command;
use crate::force::components::{xyz_forces, z_forces};
use crate::force::MirrorForces;
use crate::model::Model;
use crate::publisher::Event;

pub(super) fn handle(model: &mut Model, state: DetailedState, command: &Command) -> Transition {
    let engineering = state.is_engineering();
    let active = matches!(state, Active | ActiveEngineering);

    match (state, command) {
        (_, Command::Update) => update(model, state),

        // ─── Lifecycle ──────────────────────────────────────────────
        (Parked, Command::EnterEngineering) => Ok(Some(ParkedEngineering)),
        (Active, Command::EnterEngineering) => Ok(Some(ActiveEngineering)),
        (ParkedEngineering, Command::ExitEngineering) => {
            model.hardpoints.stop_motion();
            Ok(Some(Parked))
        }
        (ActiveEngineering, Command::ExitEngineering) => {
            model.hardpoints.stop_motion();
            Ok(Some(Active))
        }
        (Parked | ParkedEngineering, Command::Disable) => {
            model.turn_air_off()?;
            model.turn_power_off(PowerNetworks::AUX)?;
            model.zero_all_forces();
            Ok(Some(DetailedState::Disabled))
        }

        // ─── Raise / lower ──────────────────────────────────────────
        (Parked, Command::RaiseM1M3(p)) if p.bypass_reference_position => Err(StateError::Rejected(
            "Bypassing the reference position is only allowed in engineering mode.".to_string(),
        )),
        (Parked | ParkedEngineering, Command::RaiseM1M3(p)) => {
            let Model {
                automatic,
                force,
                hardpoints,
                ..
            } = model;
            automatic.start_raise_operation(p.bypass_reference_position, force, hardpoints);
            Ok(Some(if engineering { RaisingEngineering } else { Raising }))
        }
        (Raising | RaisingEngineering, Command::AbortRaiseM1M3) => {
            let Model {
                automatic,
                force,
                hardpoints,
                ..
            } = model;
            automatic.abort_raise_m1m3(force, hardpoints);
            Ok(Some(if engineering { LoweringEngineering } else { Lowering }))
        }
        (Active | ActiveEngineering, Command::LowerM1M3) => {
            let Model {
                automatic,
                force,
                hardpoints,
                ..
            } = model;
            automatic.start_lower_operation(force, hardpoints);
            Ok(Some(if engineering { LoweringEngineering } else { Lowering }))
        }

        // ─── Any enabled state ──────────────────────────────────────
        (_, Command::StoreTmaAzimuthSample(p)) => {
            model.force.set_tma_azimuth(p.azimuth_angle);
            Ok(None)
        }
        (_, Command::StoreTmaElevationSample(p)) => {
            model.force.set_tma_elevation(p.elevation_angle);
            Ok(None)
        }
        (_, Command::Panic) => {
            model.safety.user_panic();
            Ok(None)
        }

        // ─── Active ─────────────────────────────────────────────────
        (_, Command::ApplyActiveOpticForces(p)) if active => {
            model.force.apply_active_optic_forces(z_forces(&p.z_forces)?);
            Ok(None)
        }
        (_, Command::ApplyActiveOpticForcesByBendingModes(p)) if active => {
            model.force.apply_active_optic_forces_by_bending_modes(&p.coefficients)?;
            Ok(None)
        }
        (_, Command::ClearActiveOpticForces) if active => {
            model.force.zero_active_optic_forces();
            Ok(None)
        }
        (_, Command::ApplyAberrationForces(p)) if active => {
            model.force.apply_aberration_forces(z_forces(&p.z_forces)?);
            Ok(None)
        }
        (_, Command::ApplyAberrationForcesByBendingModes(p)) if active => {
            model.force.apply_aberration_forces_by_bending_modes(&p.coefficients)?;
            Ok(None)
        }
        (_, Command::ClearAberrationForces) if active => {
            model.force.zero_aberration_forces();
            Ok(None)
        }
        (_, Command::ApplyAosCorrection(p)) if active => {
            model
                .force
                .apply_active_optic_forces_by_bending_modes(&p.active_optic_coefficients)?;
            model
                .force
                .apply_aberration_forces_by_bending_modes(&p.aberration_coefficients)?;
            Ok(None)
        }
        (_, Command::EnableHardpointCorrections) if active => {
            model.force.apply_balance_forces();
            Ok(None)
        }
        (_, Command::DisableHardpointCorrections) if active => {
            model.force.zero_balance_forces();
            Ok(None)
        }

        // ─── Engineering ────────────────────────────────────────────
        (_, Command::ApplyOffsetForces(p)) if engineering => {
            model
                .force
                .apply_offset_forces(xyz_forces(&p.x_forces, &p.y_forces, &p.z_forces)?);
            Ok(None)
        }
        (_, Command::ApplyOffsetForcesByMirrorForce(p)) if engineering => {
            model.force.apply_offset_forces_by_mirror_force(&MirrorForces {
                fx: p.x_force,
                fy: p.y_force,
                fz: p.z_force,
                mx: p.x_moment,
                my: p.y_moment,
                mz: p.z_moment,
            });
            Ok(None)
        }
        (_, Command::ClearOffsetForces) if engineering => {
            model.force.zero_offset_forces();
            Ok(None)
        }
        (_, Command::MoveHardpointActuators(p)) if engineering => {
            model.hardpoints.move_steps(p.steps)?;
            Ok(None)
        }
        (_, Command::EnableHardpointChase(p)) if engineering => {
            model.hardpoints.enable_chase(p.hardpoint()?)?;
            Ok(None)
        }
        (_, Command::DisableHardpointChase(p)) if engineering => {
            model.hardpoints.disable_chase(p.hardpoint()?);
            Ok(None)
        }
        (_, Command::StopHardpointMotion) if engineering => {
            model.hardpoints.stop_motion();
            Ok(None)
        }
        (_, Command::TestHardpoint(p)) if engineering => {
            model.hardpoints.test_hardpoint(p.hardpoint()?)?;
            Ok(None)
        }
        (_, Command::TurnAirOn) if engineering => {
            model.turn_air_on()?;
            Ok(None)
        }
        (_, Command::TurnAirOff) if engineering => {
            model.turn_air_off()?;
            Ok(None)
        }
        (_, Command::TurnLightsOn) if engineering => {
            model.turn_lights_on()?;
            Ok(None)
        }
        (_, Command::TurnLightsOff) if engineering => {
            model.turn_lights_off()?;
            Ok(None)
        }
        (_, Command::TurnPowerOn(p)) if engineering => {
            model.turn_power_on(p.networks)?;
            Ok(None)
        }
        (_, Command::TurnPowerOff(p)) if engineering => {
            model.turn_power_off(p.networks)?;
            Ok(None)
        }
        (_, Command::ModbusTransmit(p)) if engineering => {
            model.modbus_transmit(p.actuator_id, p.function_code, &p.data)?;
            Ok(None)
        }

        // ─── ActiveEngineering ──────────────────────────────────────
        (ActiveEngineering, Command::TranslateM1M3(p)) => {
            model.hardpoints.translate(p.to_array())?;
            Ok(None)
        }
        (ActiveEngineering, Command::PositionM1M3(p)) => {
            model.hardpoints.position(p.to_array())?;
            Ok(None)
        }
        (ActiveEngineering, Command::UpdatePid(p)) => {
            model.force.update_pid(p.pid, p.parameters())?;
            publish_pid(model, p.pid)?;
            Ok(None)
        }
        (ActiveEngineering, Command::ResetPid(p)) => {
            model.force.reset_pid(p.pid)?;
            publish_pid(model, p.pid)?;
            Ok(None)
        }

        _ => Err(StateError::not_valid(command, state)),
    }
}

fn publish_pid(model: &Model, pid: u8) -> Result<(), StateError> {
    let parameters = model.force.pid_parameters(pid)?;
    model.publisher().publish(Event::PidInfo {
        timestamp: model.now(),
        pid,
        parameters,
    });
    Ok(())
}

/// One outer-loop cycle in an enabled state.
fn update(model: &mut Model, state: DetailedState) -> Transition {
    match state {
        Raising | RaisingEngineering => {
            let readings = *model.readings();
            {
                let Model {
                    automatic,
                    force,
                    hardpoints,
                    ..
                } = &mut *model;
                automatic.try_increment_support_percentage(force, hardpoints, &readings);
            }
            model.enabled_update();

            let Model {
                automatic,
                force,
                hardpoints,
                safety,
                ..
            } = model;
            if automatic.check_raise_operation_complete(force, hardpoints) {
                automatic.complete_raise_operation(force);
                info!("Mirror raised");
                Ok(Some(if state == Raising { Active } else { ActiveEngineering }))
            } else {
                if automatic.check_raise_operation_timeout() {
                    automatic.timeout_raise_operation(force, safety);
                }
                Ok(None)
            }
        }
        Lowering | LoweringEngineering => {
            {
                let Model {
                    automatic,
                    force,
                    hardpoints,
                    ..
                } = &mut *model;
                automatic.try_decrement_support_percentage(force, hardpoints);
            }
            model.enabled_update();

            let Model {
                automatic,
                force,
                hardpoints,
                safety,
                ..
            } = model;
            if automatic.check_lower_operation_complete(force) {
                automatic.complete_lower_operation(force, hardpoints);
                info!("Mirror lowered");
                Ok(Some(if state == Lowering { Parked } else { ParkedEngineering }))
            } else {
                if automatic.check_lower_operation_timeout() {
                    automatic.timeout_lower_operation(force, safety);
                }
                Ok(None)
            }
        }
        _ => {
            model.enabled_update();
            Ok(None)
        }
    }
}
