//! The water tank demo pair: a tank environment integrating its level with
//! explicit Euler, and a two-point controller switching the pump.

use crate::slave::{Instantiation, Logger, Slave, SlaveModule, Status};

pub(super) const ENV_DESCRIPTION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="1.0" modelName="waterTankEnv"
    modelIdentifier="waterTankEnv"
    guid="{8c4e810f-3da3-4a00-8276-176fa3c9f000}"
    numberOfContinuousStates="1" numberOfEventIndicators="0">
  <ModelVariables>
    <ScalarVariable name="v1" valueReference="0" variability="parameter"
        description="inflow rate while the pump runs">
      <Real start="3"/>
    </ScalarVariable>
    <ScalarVariable name="v2" valueReference="1" variability="parameter"
        description="constant outflow rate">
      <Real start="2"/>
    </ScalarVariable>
    <ScalarVariable name="level" valueReference="2" causality="output">
      <Real start="1"/>
    </ScalarVariable>
    <ScalarVariable name="der(level)" valueReference="3">
      <Real start="1"/>
    </ScalarVariable>
    <ScalarVariable name="pump" valueReference="0" causality="input">
      <Boolean start="true"/>
    </ScalarVariable>
  </ModelVariables>
  <Implementation>
    <CoSimulation_StandAlone>
      <Capabilities canHandleVariableCommunicationStepSize="true" canHandleEvents="true"/>
    </CoSimulation_StandAlone>
  </Implementation>
</fmiModelDescription>
"#;

pub(super) const CTR_DESCRIPTION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="1.0" modelName="waterTankCtr"
    modelIdentifier="waterTankCtr"
    guid="{8c4e810f-3da3-4a00-8276-176fa3c9f001}"
    numberOfContinuousStates="0" numberOfEventIndicators="0">
  <ModelVariables>
    <ScalarVariable name="H" valueReference="0" variability="parameter"
        description="level above which the pump switches off">
      <Real start="14"/>
    </ScalarVariable>
    <ScalarVariable name="L" valueReference="1" variability="parameter"
        description="level below which the pump switches on">
      <Real start="1"/>
    </ScalarVariable>
    <ScalarVariable name="level" valueReference="2" causality="input">
      <Real start="1"/>
    </ScalarVariable>
    <ScalarVariable name="pump" valueReference="0" causality="output">
      <Boolean start="true"/>
    </ScalarVariable>
  </ModelVariables>
  <Implementation>
    <CoSimulation_StandAlone>
      <Capabilities canHandleVariableCommunicationStepSize="true" canHandleEvents="true"/>
    </CoSimulation_StandAlone>
  </Implementation>
</fmiModelDescription>
"#;

const ENV_GUID: &str = "{8c4e810f-3da3-4a00-8276-176fa3c9f000}";
const CTR_GUID: &str = "{8c4e810f-3da3-4a00-8276-176fa3c9f001}";

// real value references of the environment model
const VR_V1: u32 = 0;
const VR_V2: u32 = 1;
const VR_LEVEL: u32 = 2;
const VR_DER_LEVEL: u32 = 3;
// boolean value reference shared by both models
const VR_PUMP: u32 = 0;
// real value references of the controller
const VR_H: u32 = 0;
const VR_L: u32 = 1;
const VR_CTR_LEVEL: u32 = 2;

/// Tank model: `der(level) = pump ? v1 - v2 : -v2`, integrated with one
/// explicit Euler step per communication step.
pub struct WaterTankEnv;

impl SlaveModule for WaterTankEnv {
    fn instantiate(&self, args: &Instantiation) -> Option<Box<dyn Slave>> {
        if args.guid != ENV_GUID {
            (args.logger)(
                args.instance_name,
                Status::Error,
                "error",
                &format!("wrong GUID {}, expected {ENV_GUID}", args.guid),
            );
            return None;
        }
        Some(Box::new(WaterTankEnvInstance {
            name: args.instance_name.to_string(),
            logger: args.logger.clone(),
            logging_on: args.logging_on,
            r: [3.0, 2.0, 1.0, 1.0],
            pump: true,
        }))
    }
}

struct WaterTankEnvInstance {
    name: String,
    logger: Logger,
    logging_on: bool,
    /// v1, v2, level, der(level) in value reference order.
    r: [f64; 4],
    pump: bool,
}

impl WaterTankEnvInstance {
    fn derivative(&self) -> f64 {
        if self.pump {
            self.r[VR_V1 as usize] - self.r[VR_V2 as usize]
        } else {
            -self.r[VR_V2 as usize]
        }
    }

    fn bad_vr(&self, vr: u32) -> Status {
        if self.logging_on {
            (self.logger)(
                &self.name,
                Status::Error,
                "error",
                &format!("unknown value reference {vr}"),
            );
        }
        Status::Error
    }
}

impl Slave for WaterTankEnvInstance {
    fn initialize(&mut self, _t_start: f64, _stop_time_defined: bool, _t_stop: f64) -> Status {
        self.r[VR_DER_LEVEL as usize] = self.derivative();
        Status::Ok
    }

    fn get_real(&mut self, vrs: &[u32], values: &mut [f64]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match self.r.get(vr as usize) {
                Some(&v) => values[i] = v,
                None => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn get_integer(&mut self, vrs: &[u32], _values: &mut [i32]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn get_boolean(&mut self, vrs: &[u32], values: &mut [bool]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            if vr != VR_PUMP {
                return self.bad_vr(vr);
            }
            values[i] = self.pump;
        }
        Status::Ok
    }

    fn get_string(&mut self, vrs: &[u32], _values: &mut [String]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn set_real(&mut self, vrs: &[u32], values: &[f64]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match self.r.get_mut(vr as usize) {
                Some(slot) => *slot = values[i],
                None => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn set_integer(&mut self, vrs: &[u32], _values: &[i32]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn set_boolean(&mut self, vrs: &[u32], values: &[bool]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            if vr != VR_PUMP {
                return self.bad_vr(vr);
            }
            self.pump = values[i];
        }
        Status::Ok
    }

    fn set_string(&mut self, vrs: &[u32], _values: &[&str]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn do_step(&mut self, _current_time: f64, step_size: f64, _new_step: bool) -> Status {
        self.r[VR_DER_LEVEL as usize] = self.derivative();
        self.r[VR_LEVEL as usize] += self.r[VR_DER_LEVEL as usize] * step_size;
        Status::Ok
    }

    fn terminate(&mut self) -> Status {
        Status::Ok
    }
}

/// Two-point controller: the pump switches off above `H` and back on
/// below `L`, with hysteresis in between.
pub struct WaterTankCtr;

impl SlaveModule for WaterTankCtr {
    fn instantiate(&self, args: &Instantiation) -> Option<Box<dyn Slave>> {
        if args.guid != CTR_GUID {
            (args.logger)(
                args.instance_name,
                Status::Error,
                "error",
                &format!("wrong GUID {}, expected {CTR_GUID}", args.guid),
            );
            return None;
        }
        Some(Box::new(WaterTankCtrInstance {
            name: args.instance_name.to_string(),
            logger: args.logger.clone(),
            logging_on: args.logging_on,
            r: [14.0, 1.0, 1.0],
            pump: true,
        }))
    }
}

struct WaterTankCtrInstance {
    name: String,
    logger: Logger,
    logging_on: bool,
    /// H, L, level in value reference order.
    r: [f64; 3],
    pump: bool,
}

impl WaterTankCtrInstance {
    fn bad_vr(&self, vr: u32) -> Status {
        if self.logging_on {
            (self.logger)(
                &self.name,
                Status::Error,
                "error",
                &format!("unknown value reference {vr}"),
            );
        }
        Status::Error
    }

    fn update(&mut self) {
        if self.r[VR_CTR_LEVEL as usize] > self.r[VR_H as usize] {
            self.pump = false;
        } else if self.r[VR_CTR_LEVEL as usize] < self.r[VR_L as usize] {
            self.pump = true;
        }
    }
}

impl Slave for WaterTankCtrInstance {
    fn initialize(&mut self, _t_start: f64, _stop_time_defined: bool, _t_stop: f64) -> Status {
        self.update();
        Status::Ok
    }

    fn get_real(&mut self, vrs: &[u32], values: &mut [f64]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match self.r.get(vr as usize) {
                Some(&v) => values[i] = v,
                None => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn get_integer(&mut self, vrs: &[u32], _values: &mut [i32]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn get_boolean(&mut self, vrs: &[u32], values: &mut [bool]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            if vr != VR_PUMP {
                return self.bad_vr(vr);
            }
            values[i] = self.pump;
        }
        Status::Ok
    }

    fn get_string(&mut self, vrs: &[u32], _values: &mut [String]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn set_real(&mut self, vrs: &[u32], values: &[f64]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match self.r.get_mut(vr as usize) {
                Some(slot) => *slot = values[i],
                None => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn set_integer(&mut self, vrs: &[u32], _values: &[i32]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn set_boolean(&mut self, vrs: &[u32], values: &[bool]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            if vr != VR_PUMP {
                return self.bad_vr(vr);
            }
            self.pump = values[i];
        }
        Status::Ok
    }

    fn set_string(&mut self, vrs: &[u32], _values: &[&str]) -> Status {
        vrs.first().map_or(Status::Ok, |&vr| self.bad_vr(vr))
    }

    fn do_step(&mut self, _current_time: f64, _step_size: f64, _new_step: bool) -> Status {
        self.update();
        Status::Ok
    }

    fn terminate(&mut self) -> Status {
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slave::tracing_logger;

    fn instantiate(module: &dyn SlaveModule, guid: &str) -> Option<Box<dyn Slave>> {
        module.instantiate(&Instantiation {
            instance_name: "tank",
            guid,
            location: None,
            mime_type: crate::slave::SHARED_LIBRARY_MIME_TYPE,
            timeout_ms: 1000.0,
            visible: false,
            interactive: false,
            logging_on: false,
            logger: tracing_logger(),
        })
    }

    #[test]
    fn wrong_guid_fails_instantiation() {
        assert!(instantiate(&WaterTankEnv, "{bad}").is_none());
        assert!(instantiate(&WaterTankEnv, ENV_GUID).is_some());
    }

    #[test]
    fn tank_level_rises_while_pump_runs() {
        let mut env = instantiate(&WaterTankEnv, ENV_GUID).unwrap();
        assert_eq!(env.initialize(0.0, true, 1.0), Status::Ok);
        let mut level = [0.0];
        env.get_real(&[VR_LEVEL], &mut level);
        assert_eq!(level[0], 1.0);
        // one Euler step with pump on: level += (v1 - v2) * h
        env.do_step(0.0, 0.5, true);
        env.get_real(&[VR_LEVEL], &mut level);
        assert_eq!(level[0], 1.5);
        // pump off: level += -v2 * h
        env.set_boolean(&[VR_PUMP], &[false]);
        env.do_step(0.5, 0.5, true);
        env.get_real(&[VR_LEVEL], &mut level);
        assert_eq!(level[0], 0.5);
    }

    #[test]
    fn controller_switches_with_hysteresis() {
        let mut ctr = instantiate(&WaterTankCtr, CTR_GUID).unwrap();
        ctr.initialize(0.0, true, 1.0);
        let mut pump = [false];
        ctr.get_boolean(&[VR_PUMP], &mut pump);
        assert!(pump[0]);

        // above H the pump switches off
        ctr.set_real(&[VR_CTR_LEVEL], &[15.0]);
        ctr.do_step(0.0, 0.1, true);
        ctr.get_boolean(&[VR_PUMP], &mut pump);
        assert!(!pump[0]);

        // between L and H it stays off
        ctr.set_real(&[VR_CTR_LEVEL], &[5.0]);
        ctr.do_step(0.1, 0.1, true);
        ctr.get_boolean(&[VR_PUMP], &mut pump);
        assert!(!pump[0]);

        // below L it switches back on
        ctr.set_real(&[VR_CTR_LEVEL], &[0.5]);
        ctr.do_step(0.2, 0.1, true);
        ctr.get_boolean(&[VR_PUMP], &mut pump);
        assert!(pump[0]);
    }

    #[test]
    fn unknown_value_reference_is_an_error() {
        let mut env = instantiate(&WaterTankEnv, ENV_GUID).unwrap();
        let mut out = [0.0];
        assert_eq!(env.get_real(&[99], &mut out), Status::Error);
        assert_eq!(env.get_integer(&[0], &mut [0]), Status::Error);
    }
}
