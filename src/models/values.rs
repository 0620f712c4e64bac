//! Demo slave exercising all four value types. One real state decays
//! exponentially; at every whole second the integer output increments, the
//! boolean output toggles and the string output advances to the next month.

use crate::slave::{Instantiation, Logger, Slave, SlaveModule, Status};

pub(super) const DESCRIPTION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="1.0" modelName="values"
    modelIdentifier="values"
    guid="{8c4e810f-3da3-4a00-8276-176fa3c9f002}"
    numberOfContinuousStates="1" numberOfEventIndicators="1">
  <ModelVariables>
    <ScalarVariable name="x" valueReference="0" causality="output">
      <Real start="1"/>
    </ScalarVariable>
    <ScalarVariable name="der(x)" valueReference="1">
      <Real/>
    </ScalarVariable>
    <ScalarVariable name="int_in" valueReference="0" causality="input">
      <Integer start="2"/>
    </ScalarVariable>
    <ScalarVariable name="int_out" valueReference="1" causality="output">
      <Integer start="0"/>
    </ScalarVariable>
    <ScalarVariable name="bool_in" valueReference="0" causality="input">
      <Boolean start="true"/>
    </ScalarVariable>
    <ScalarVariable name="bool_out" valueReference="1" causality="output">
      <Boolean start="false"/>
    </ScalarVariable>
    <ScalarVariable name="string_in" valueReference="0" causality="input">
      <String start="a string"/>
    </ScalarVariable>
    <ScalarVariable name="string_out" valueReference="1" causality="output">
      <String start="jan."/>
    </ScalarVariable>
  </ModelVariables>
  <Implementation>
    <CoSimulation_StandAlone>
      <Capabilities canHandleVariableCommunicationStepSize="true" canHandleEvents="true"/>
    </CoSimulation_StandAlone>
  </Implementation>
</fmiModelDescription>
"#;

const GUID: &str = "{8c4e810f-3da3-4a00-8276-176fa3c9f002}";

const VR_X: u32 = 0;
const VR_DER_X: u32 = 1;
const VR_IN: u32 = 0;
const VR_OUT: u32 = 1;

const MONTHS: [&str; 12] = [
    "jan.", "feb.", "march", "april", "may", "june", "july", "august", "sept.", "oct.", "nov.",
    "dec.",
];

pub struct Values;

impl SlaveModule for Values {
    fn instantiate(&self, args: &Instantiation) -> Option<Box<dyn Slave>> {
        if args.guid != GUID {
            (args.logger)(
                args.instance_name,
                Status::Error,
                "error",
                &format!("wrong GUID {}, expected {GUID}", args.guid),
            );
            return None;
        }
        Some(Box::new(ValuesInstance {
            name: args.instance_name.to_string(),
            logger: args.logger.clone(),
            logging_on: args.logging_on,
            time: 0.0,
            x: 1.0,
            int_in: 2,
            int_out: 0,
            bool_in: true,
            bool_out: false,
            string_in: "a string".to_string(),
            string_out: MONTHS[0].to_string(),
            next_event: 1.0,
        }))
    }
}

struct ValuesInstance {
    name: String,
    logger: Logger,
    logging_on: bool,
    time: f64,
    x: f64,
    int_in: i32,
    int_out: i32,
    bool_in: bool,
    bool_out: bool,
    string_in: String,
    string_out: String,
    /// Time of the next whole-second event.
    next_event: f64,
}

impl ValuesInstance {
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

impl Slave for ValuesInstance {
    fn initialize(&mut self, t_start: f64, _stop_time_defined: bool, _t_stop: f64) -> Status {
        self.time = t_start;
        self.next_event = t_start.floor() + 1.0;
        Status::Ok
    }

    fn get_real(&mut self, vrs: &[u32], values: &mut [f64]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            values[i] = match vr {
                VR_X => self.x,
                VR_DER_X => -self.x,
                _ => return self.bad_vr(vr),
            };
        }
        Status::Ok
    }

    fn get_integer(&mut self, vrs: &[u32], values: &mut [i32]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            values[i] = match vr {
                VR_IN => self.int_in,
                VR_OUT => self.int_out,
                _ => return self.bad_vr(vr),
            };
        }
        Status::Ok
    }

    fn get_boolean(&mut self, vrs: &[u32], values: &mut [bool]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            values[i] = match vr {
                VR_IN => self.bool_in,
                VR_OUT => self.bool_out,
                _ => return self.bad_vr(vr),
            };
        }
        Status::Ok
    }

    fn get_string(&mut self, vrs: &[u32], values: &mut [String]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            values[i] = match vr {
                VR_IN => self.string_in.clone(),
                VR_OUT => self.string_out.clone(),
                _ => return self.bad_vr(vr),
            };
        }
        Status::Ok
    }

    fn set_real(&mut self, vrs: &[u32], values: &[f64]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match vr {
                VR_X => self.x = values[i],
                _ => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn set_integer(&mut self, vrs: &[u32], values: &[i32]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match vr {
                VR_IN => self.int_in = values[i],
                _ => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn set_boolean(&mut self, vrs: &[u32], values: &[bool]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match vr {
                VR_IN => self.bool_in = values[i],
                _ => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn set_string(&mut self, vrs: &[u32], values: &[&str]) -> Status {
        for (i, &vr) in vrs.iter().enumerate() {
            match vr {
                VR_IN => self.string_in = values[i].to_string(),
                _ => return self.bad_vr(vr),
            }
        }
        Status::Ok
    }

    fn do_step(&mut self, _current_time: f64, step_size: f64, _new_step: bool) -> Status {
        self.x += -self.x * step_size;
        self.time += step_size;
        while self.time >= self.next_event - 1e-9 {
            self.int_out += 1;
            self.bool_out = !self.bool_out;
            self.string_out = MONTHS[self.int_out as usize % MONTHS.len()].to_string();
            self.next_event += 1.0;
        }
        Status::Ok
    }

    fn terminate(&mut self) -> Status {
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slave::{SHARED_LIBRARY_MIME_TYPE, tracing_logger};

    fn instance() -> Box<dyn Slave> {
        Values
            .instantiate(&Instantiation {
                instance_name: "values",
                guid: GUID,
                location: None,
                mime_type: SHARED_LIBRARY_MIME_TYPE,
                timeout_ms: 1000.0,
                visible: false,
                interactive: false,
                logging_on: false,
                logger: tracing_logger(),
            })
            .unwrap()
    }

    #[test]
    fn discrete_outputs_change_at_whole_seconds() {
        let mut slave = instance();
        slave.initialize(0.0, true, 2.5);
        let mut ints = [0];
        let mut bools = [false];
        let mut strings = [String::new()];

        for _ in 0..9 {
            slave.do_step(0.0, 0.1, true);
        }
        slave.get_integer(&[VR_OUT], &mut ints);
        assert_eq!(ints[0], 0);

        slave.do_step(0.9, 0.1, true);
        slave.get_integer(&[VR_OUT], &mut ints);
        slave.get_boolean(&[VR_OUT], &mut bools);
        slave.get_string(&[VR_OUT], &mut strings);
        assert_eq!(ints[0], 1);
        assert!(bools[0]);
        assert_eq!(strings[0], "feb.");
    }

    #[test]
    fn state_decays_toward_zero() {
        let mut slave = instance();
        slave.initialize(0.0, true, 1.0);
        let mut x = [0.0];
        slave.do_step(0.0, 0.5, true);
        slave.get_real(&[VR_X], &mut x);
        assert_eq!(x[0], 0.5);
        let mut der = [0.0];
        slave.get_real(&[VR_DER_X], &mut der);
        assert_eq!(der[0], -0.5);
    }

    #[test]
    fn string_input_round_trips() {
        let mut slave = instance();
        slave.initialize(0.0, false, 0.0);
        assert_eq!(slave.set_string(&[VR_IN], &["hello"]), Status::Ok);
        let mut s = [String::new()];
        assert_eq!(slave.get_string(&[VR_IN], &mut s), Status::Ok);
        assert_eq!(s[0], "hello");
    }
}
