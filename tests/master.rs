use camino::Utf8Path;
use fmusim::master::{Master, RunConfig, SimulationError};
use fmusim::parser::{parse_graph, parse_model_description};
use fmusim::slave::{
    ComponentLoader, Instantiation, LoadError, LoadedComponent, Slave, SlaveModule, Status,
};
use fmusim::validator::validate_graph;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const PRODUCER_XML: &str = r#"<fmiModelDescription fmiVersion="1.0" modelName="producer"
    modelIdentifier="producer" guid="{producer}">
  <ModelVariables>
    <ScalarVariable name="count" valueReference="0" causality="output">
      <Real start="0"/>
    </ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

const SINK_XML: &str = r#"<fmiModelDescription fmiVersion="1.0" modelName="sink"
    modelIdentifier="sink" guid="{sink}">
  <ModelVariables>
    <ScalarVariable name="value" valueReference="0" causality="input">
      <Real start="0"/>
    </ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

const GRAPH_XML: &str = r#"<Graph>
  <Components>
    <Component name="producer" fmuPath="producer">
      <Outputs>
        <Port name="count" type="Real" connection="c"/>
      </Outputs>
    </Component>
    <Component name="sink" fmuPath="sink">
      <Inputs>
        <Port name="value" type="Real" connection="c"/>
      </Inputs>
    </Component>
  </Components>
  <Connections>
    <Connection name="c"/>
  </Connections>
</Graph>"#;

/// Observations shared between a test and its fake slaves.
#[derive(Default)]
struct Probe {
    received: Vec<f64>,
    terminated: u32,
}

/// Outputs the number of completed steps; optionally fails a chosen step.
struct ProducerModule {
    probe: Rc<RefCell<Probe>>,
    fail_at_step: Option<u64>,
}

struct ProducerSlave {
    probe: Rc<RefCell<Probe>>,
    fail_at_step: Option<u64>,
    count: u64,
}

impl SlaveModule for ProducerModule {
    fn instantiate(&self, _args: &Instantiation) -> Option<Box<dyn Slave>> {
        Some(Box::new(ProducerSlave {
            probe: self.probe.clone(),
            fail_at_step: self.fail_at_step,
            count: 0,
        }))
    }
}

impl Slave for ProducerSlave {
    fn initialize(&mut self, _t: f64, _defined: bool, _stop: f64) -> Status {
        Status::Ok
    }
    fn get_real(&mut self, _vrs: &[u32], values: &mut [f64]) -> Status {
        values[0] = self.count as f64;
        Status::Ok
    }
    fn get_integer(&mut self, _vrs: &[u32], _values: &mut [i32]) -> Status {
        Status::Ok
    }
    fn get_boolean(&mut self, _vrs: &[u32], _values: &mut [bool]) -> Status {
        Status::Ok
    }
    fn get_string(&mut self, _vrs: &[u32], _values: &mut [String]) -> Status {
        Status::Ok
    }
    fn set_real(&mut self, _vrs: &[u32], _values: &[f64]) -> Status {
        Status::Ok
    }
    fn set_integer(&mut self, _vrs: &[u32], _values: &[i32]) -> Status {
        Status::Ok
    }
    fn set_boolean(&mut self, _vrs: &[u32], _values: &[bool]) -> Status {
        Status::Ok
    }
    fn set_string(&mut self, _vrs: &[u32], _values: &[&str]) -> Status {
        Status::Ok
    }
    fn do_step(&mut self, _t: f64, _h: f64, _new_step: bool) -> Status {
        if self.fail_at_step == Some(self.count) {
            return Status::Error;
        }
        self.count += 1;
        Status::Ok
    }
    fn terminate(&mut self) -> Status {
        self.probe.borrow_mut().terminated += 1;
        Status::Ok
    }
}

/// Records every value written to its input.
struct SinkModule {
    probe: Rc<RefCell<Probe>>,
}

struct SinkSlave {
    probe: Rc<RefCell<Probe>>,
    last: f64,
}

impl SlaveModule for SinkModule {
    fn instantiate(&self, _args: &Instantiation) -> Option<Box<dyn Slave>> {
        Some(Box::new(SinkSlave {
            probe: self.probe.clone(),
            last: 0.0,
        }))
    }
}

impl Slave for SinkSlave {
    fn initialize(&mut self, _t: f64, _defined: bool, _stop: f64) -> Status {
        Status::Ok
    }
    fn get_real(&mut self, _vrs: &[u32], values: &mut [f64]) -> Status {
        values[0] = self.last;
        Status::Ok
    }
    fn get_integer(&mut self, _vrs: &[u32], _values: &mut [i32]) -> Status {
        Status::Ok
    }
    fn get_boolean(&mut self, _vrs: &[u32], _values: &mut [bool]) -> Status {
        Status::Ok
    }
    fn get_string(&mut self, _vrs: &[u32], _values: &mut [String]) -> Status {
        Status::Ok
    }
    fn set_real(&mut self, _vrs: &[u32], values: &[f64]) -> Status {
        self.last = values[0];
        self.probe.borrow_mut().received.push(values[0]);
        Status::Ok
    }
    fn set_integer(&mut self, _vrs: &[u32], _values: &[i32]) -> Status {
        Status::Ok
    }
    fn set_boolean(&mut self, _vrs: &[u32], _values: &[bool]) -> Status {
        Status::Ok
    }
    fn set_string(&mut self, _vrs: &[u32], _values: &[&str]) -> Status {
        Status::Ok
    }
    fn do_step(&mut self, _t: f64, _h: f64, _new_step: bool) -> Status {
        Status::Ok
    }
    fn terminate(&mut self) -> Status {
        self.probe.borrow_mut().terminated += 1;
        Status::Ok
    }
}

/// Module whose instantiation always fails.
struct BrokenModule;

impl SlaveModule for BrokenModule {
    fn instantiate(&self, _args: &Instantiation) -> Option<Box<dyn Slave>> {
        None
    }
}

/// Hands out pre-registered modules by path; each at most once.
struct FakeLoader {
    descriptions: HashMap<String, &'static str>,
    modules: RefCell<HashMap<String, Box<dyn SlaveModule>>>,
}

impl FakeLoader {
    fn new() -> Self {
        FakeLoader {
            descriptions: HashMap::new(),
            modules: RefCell::new(HashMap::new()),
        }
    }

    fn register(&mut self, name: &str, xml: &'static str, module: Box<dyn SlaveModule>) {
        self.descriptions.insert(name.to_string(), xml);
        self.modules.borrow_mut().insert(name.to_string(), module);
    }
}

impl ComponentLoader for FakeLoader {
    fn load(&self, path: &Utf8Path) -> Result<LoadedComponent, LoadError> {
        let module = self
            .modules
            .borrow_mut()
            .remove(path.as_str())
            .ok_or_else(|| LoadError::UnknownModel(path.to_string()))?;
        let description = parse_model_description(self.descriptions[path.as_str()])?;
        Ok(LoadedComponent {
            description,
            module,
        })
    }
}

fn validated_graph(xml: &str) -> fmusim::ast::Graph {
    let mut graph = parse_graph(xml).unwrap();
    validate_graph(&mut graph).unwrap();
    graph
}

#[test]
fn consumer_sees_the_producers_previous_step_value() {
    let probe = Rc::new(RefCell::new(Probe::default()));
    let mut loader = FakeLoader::new();
    loader.register(
        "producer",
        PRODUCER_XML,
        Box::new(ProducerModule {
            probe: probe.clone(),
            fail_at_step: None,
        }),
    );
    loader.register("sink", SINK_XML, Box::new(SinkModule { probe: probe.clone() }));

    let mut master = Master::load(validated_graph(GRAPH_XML), &loader).unwrap();
    let mut trace = Vec::new();
    let summary = master.run(&RunConfig::default(), &mut trace).unwrap();

    // tEnd=1.0 with h=0.1 is exactly ten steps, eleven rows
    assert_eq!(summary.steps, 10);
    assert_eq!(summary.rows, 11);

    // every input write carries the output of the step before
    let expected: Vec<f64> = (0..10).map(f64::from).collect();
    assert_eq!(probe.borrow().received, expected);

    let trace = String::from_utf8(trace).unwrap();
    let lines: Vec<&str> = trace.lines().collect();
    assert_eq!(lines.len(), 12);
    assert_eq!(lines[0], "time;producer.count;sink.value");
    assert_eq!(lines[1], "0;0;0");
    assert!(lines[11].ends_with(";10;9"));

    // both instances were released through terminate
    assert_eq!(probe.borrow().terminated, 2);
}

#[test]
fn step_failure_still_tears_every_instance_down() {
    let probe = Rc::new(RefCell::new(Probe::default()));
    let mut loader = FakeLoader::new();
    loader.register(
        "producer",
        PRODUCER_XML,
        Box::new(ProducerModule {
            probe: probe.clone(),
            fail_at_step: Some(3),
        }),
    );
    loader.register("sink", SINK_XML, Box::new(SinkModule { probe: probe.clone() }));

    let mut master = Master::load(validated_graph(GRAPH_XML), &loader).unwrap();
    let mut trace = Vec::new();
    let err = master.run(&RunConfig::default(), &mut trace).unwrap_err();

    match err {
        SimulationError::Step {
            component,
            operation,
            status,
            ..
        } => {
            assert_eq!(component, "producer");
            assert_eq!(operation, "doStep");
            assert_eq!(status, Status::Error);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(probe.borrow().terminated, 2);
}

#[test]
fn instantiation_failure_aborts_before_any_step() {
    let probe = Rc::new(RefCell::new(Probe::default()));
    let mut loader = FakeLoader::new();
    loader.register(
        "producer",
        PRODUCER_XML,
        Box::new(ProducerModule {
            probe: probe.clone(),
            fail_at_step: None,
        }),
    );
    loader.register("sink", SINK_XML, Box::new(BrokenModule));

    let mut master = Master::load(validated_graph(GRAPH_XML), &loader).unwrap();
    let mut trace = Vec::new();
    let err = master.run(&RunConfig::default(), &mut trace).unwrap_err();

    assert!(matches!(err, SimulationError::Instantiate { component } if component == "sink"));
    assert!(trace.is_empty());
    // the producer was already live and still gets terminated
    assert_eq!(probe.borrow().terminated, 1);
}

#[test]
fn invalid_step_size_is_rejected() {
    let probe = Rc::new(RefCell::new(Probe::default()));
    let mut loader = FakeLoader::new();
    loader.register(
        "producer",
        PRODUCER_XML,
        Box::new(ProducerModule {
            probe: probe.clone(),
            fail_at_step: None,
        }),
    );
    loader.register("sink", SINK_XML, Box::new(SinkModule { probe }));

    let mut master = Master::load(validated_graph(GRAPH_XML), &loader).unwrap();
    let config = RunConfig {
        step_size: 0.0,
        ..RunConfig::default()
    };
    let err = master.run(&config, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, SimulationError::InvalidConfig(_)));
}

#[test]
fn component_without_a_path_fails_to_load() {
    let xml = r#"<Graph>
  <Components>
    <Component name="nameless"/>
  </Components>
</Graph>"#;
    let graph = validated_graph(xml);
    let Err(err) = Master::load(graph, &FakeLoader::new()) else {
        panic!("load succeeded without a component path");
    };
    assert!(matches!(err, LoadError::MissingPath(name) if name == "nameless"));
}

const FLAGGER_XML: &str = r#"<fmiModelDescription fmiVersion="1.0" modelName="flagger"
    modelIdentifier="flagger" guid="{flagger}">
  <ModelVariables>
    <ScalarVariable name="flag" valueReference="0" causality="output">
      <Boolean start="false"/>
    </ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

#[test]
fn port_type_must_match_the_bound_variable() {
    // both wired ports agree with each other, so graph validation passes;
    // the disagreement is between the Real port and the Boolean variable it
    // binds, which must never re-type the connection cell at runtime
    let xml = r#"<Graph>
  <Components>
    <Component name="flagger" fmuPath="flagger">
      <Outputs>
        <Port name="flag" type="Real" connection="c"/>
      </Outputs>
    </Component>
    <Component name="sink" fmuPath="sink">
      <Inputs>
        <Port name="value" type="Real" connection="c"/>
      </Inputs>
    </Component>
  </Components>
  <Connections>
    <Connection name="c"/>
  </Connections>
</Graph>"#;
    let probe = Rc::new(RefCell::new(Probe::default()));
    let mut loader = FakeLoader::new();
    loader.register(
        "flagger",
        FLAGGER_XML,
        Box::new(ProducerModule {
            probe: probe.clone(),
            fail_at_step: None,
        }),
    );
    loader.register("sink", SINK_XML, Box::new(SinkModule { probe }));

    let Err(err) = Master::load(validated_graph(xml), &loader) else {
        panic!("load accepted a port whose type disagrees with its variable");
    };
    assert!(matches!(
        err,
        LoadError::PortTypeMismatch { component, port, .. }
            if component == "flagger" && port == "flag"
    ));
}

#[test]
fn port_must_name_a_variable_of_its_component() {
    let xml = r#"<Graph>
  <Components>
    <Component name="producer" fmuPath="producer">
      <Outputs>
        <Port name="no_such_variable" type="Real" connection="c"/>
      </Outputs>
    </Component>
  </Components>
  <Connections>
    <Connection name="c"/>
  </Connections>
</Graph>"#;
    let probe = Rc::new(RefCell::new(Probe::default()));
    let mut loader = FakeLoader::new();
    loader.register(
        "producer",
        PRODUCER_XML,
        Box::new(ProducerModule {
            probe,
            fail_at_step: None,
        }),
    );
    let Err(err) = Master::load(validated_graph(xml), &loader) else {
        panic!("load resolved a variable that does not exist");
    };
    assert!(matches!(
        err,
        LoadError::UnresolvedVariable { component, port }
            if component == "producer" && port == "no_such_variable"
    ));
}
