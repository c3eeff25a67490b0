//! In-process stand-in for the service under test.
//!
//! Understands the handful of commands the harness and its smoke suites send,
//! counts resets and closes, and lets a test script replies to inject faults.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Close, Opened, Service, ServiceConfig, ServiceFactory};
use crate::error::{HarnessError, Result};
use crate::resp::{Command, Reply};

#[derive(Debug, Clone, Default)]
struct Object {
    fields: BTreeMap<String, f64>,
    point: Option<(f64, f64)>,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, BTreeMap<String, Object>>,
    output: String,
    opens: usize,
    resets: usize,
    closes: usize,
    closed: bool,
    log: Vec<String>,
    scripted: HashMap<String, VecDeque<Reply>>,
}

impl State {
    fn object_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }
}

/// Inspects and scripts a [`MemoryService`] from outside the run.
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    state: Arc<Mutex<State>>,
}

impl MemoryProbe {
    /// Reply with `reply` the next time `command` is executed, instead of
    /// running it. Replies queue up per command.
    pub fn script(&self, command: &str, reply: Reply) {
        self.state
            .lock()
            .scripted
            .entry(command.to_ascii_uppercase())
            .or_default()
            .push_back(reply);
    }

    /// Commands executed so far, with `RESET` marking each reconnect.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Commands executed so far, without reset markers.
    pub fn commands(&self) -> Vec<String> {
        self.log().into_iter().filter(|c| c != "RESET").collect()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().object_count()
    }

    pub fn output_mode(&self) -> String {
        self.state.lock().output.clone()
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Close for MemoryProbe {
    fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.closes += 1;
        }
    }
}

pub struct MemoryService {
    state: Arc<Mutex<State>>,
}

impl MemoryService {
    pub fn new() -> (Self, MemoryProbe) {
        let probe = MemoryProbe::default();
        (Self::attach(&probe), probe)
    }

    fn attach(probe: &MemoryProbe) -> Self {
        Self {
            state: probe.state.clone(),
        }
    }
}

impl Service for MemoryService {
    fn reset_conn(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HarnessError::Closed);
        }
        state.resets += 1;
        state.log.push("RESET".to_string());
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<Reply> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HarnessError::Closed);
        }
        state.log.push(command.to_string());

        let name = command.name().to_ascii_uppercase();
        if let Some(reply) = state.scripted.get_mut(&name).and_then(VecDeque::pop_front) {
            return Ok(reply);
        }
        Ok(dispatch(&mut state, &name, command.args()))
    }
}

fn dispatch(state: &mut State, name: &str, args: &[String]) -> Reply {
    match name {
        "PING" => Reply::pong(),
        "OUTPUT" => match args.first().map(|m| m.to_ascii_lowercase()) {
            Some(mode) if mode == "resp" || mode == "json" => {
                state.output = mode;
                Reply::ok()
            }
            Some(mode) => Reply::error(format!("invalid output type '{}'", mode)),
            None => Reply::from_string(state.output.clone()),
        },
        "FLUSHDB" => {
            state.collections.clear();
            Reply::ok()
        }
        "DBSIZE" => Reply::Integer(state.object_count() as i64),
        "SERVER" => Reply::from_string(format!("{{\"num_objects\":{}}}", state.object_count())),
        "SET" => cmd_set(state, args),
        "GET" => cmd_get(state, args),
        "DEL" => cmd_del(state, args),
        "NEARBY" => cmd_nearby(state, args),
        _ => Reply::error(format!("unknown command '{}'", name)),
    }
}

fn cmd_set(state: &mut State, args: &[String]) -> Reply {
    if args.len() < 2 {
        return Reply::error("wrong number of arguments for 'set' command");
    }
    let mut object = Object::default();
    let mut rest = &args[2..];
    while !rest.is_empty() {
        match rest[0].to_ascii_uppercase().as_str() {
            "FIELD" if rest.len() >= 3 => match rest[2].parse::<f64>() {
                Ok(value) => {
                    object.fields.insert(rest[1].clone(), value);
                    rest = &rest[3..];
                }
                Err(_) => return Reply::error(format!("invalid argument '{}'", rest[2])),
            },
            "POINT" if rest.len() >= 3 => match (rest[1].parse::<f64>(), rest[2].parse::<f64>()) {
                (Ok(lat), Ok(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {
                    object.point = Some((lat, lon));
                    rest = &rest[3..];
                }
                _ => return Reply::error("invalid point"),
            },
            _ => return Reply::error(format!("invalid argument '{}'", rest[0])),
        }
    }
    state
        .collections
        .entry(args[0].clone())
        .or_default()
        .insert(args[1].clone(), object);
    Reply::ok()
}

fn cmd_get(state: &State, args: &[String]) -> Reply {
    if args.len() != 2 {
        return Reply::error("wrong number of arguments for 'get' command");
    }
    let object = state
        .collections
        .get(&args[0])
        .and_then(|objects| objects.get(&args[1]));
    match object {
        Some(Object {
            point: Some((lat, lon)),
            ..
        }) => Reply::from_string(format!(
            "{{\"type\":\"Point\",\"coordinates\":[{},{}]}}",
            lon, lat
        )),
        Some(_) => Reply::from_string("{}"),
        None => Reply::null(),
    }
}

fn cmd_del(state: &mut State, args: &[String]) -> Reply {
    if args.len() != 2 {
        return Reply::error("wrong number of arguments for 'del' command");
    }
    let removed = match state.collections.get_mut(&args[0]) {
        Some(objects) => objects.remove(&args[1]).is_some(),
        None => false,
    };
    if state.collections.get(&args[0]).map_or(false, BTreeMap::is_empty) {
        state.collections.remove(&args[0]);
    }
    Reply::Integer(removed as i64)
}

/// `NEARBY key [LIMIT n] POINT lat lon meters`, answering with the ids in
/// range ordered by distance.
fn cmd_nearby(state: &State, args: &[String]) -> Reply {
    let Some(key) = args.first() else {
        return Reply::error("wrong number of arguments for 'nearby' command");
    };
    let mut limit = usize::MAX;
    let mut target = None;
    let mut rest = &args[1..];
    while !rest.is_empty() {
        match rest[0].to_ascii_uppercase().as_str() {
            "LIMIT" if rest.len() >= 2 => match rest[1].parse() {
                Ok(n) => {
                    limit = n;
                    rest = &rest[2..];
                }
                Err(_) => return Reply::error(format!("invalid argument '{}'", rest[1])),
            },
            "POINT" if rest.len() >= 4 => {
                match (rest[1].parse::<f64>(), rest[2].parse::<f64>(), rest[3].parse::<f64>()) {
                    (Ok(lat), Ok(lon), Ok(meters)) => target = Some((lat, lon, meters)),
                    _ => return Reply::error("invalid point"),
                }
                rest = &rest[4..];
            }
            _ => return Reply::error(format!("invalid argument '{}'", rest[0])),
        }
    }
    let Some((lat, lon, meters)) = target else {
        return Reply::error("missing POINT area");
    };

    let mut hits: Vec<(f64, &String)> = state
        .collections
        .get(key)
        .into_iter()
        .flat_map(|objects| objects.iter())
        .filter_map(|(id, object)| {
            let (olat, olon) = object.point?;
            let distance = haversine_meters(lat, lon, olat, olon);
            (distance <= meters).then_some((distance, id))
        })
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0));
    Reply::Array(Some(
        hits.into_iter()
            .take(limit)
            .map(|(_, id)| Reply::from_string(id.clone()))
            .collect(),
    ))
}

fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}

/// Opens [`MemoryService`]s that all share one probe.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    probe: MemoryProbe,
    fail_open: bool,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose `open` always fails, for exercising startup errors.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn probe(&self) -> MemoryProbe {
        self.probe.clone()
    }
}

impl ServiceFactory for MemoryFactory {
    type Service = MemoryService;

    fn open(&self, _config: &ServiceConfig) -> Result<Opened<MemoryService>> {
        if self.fail_open {
            return Err(HarnessError::Startup("memory service refused to open".to_string()));
        }
        self.probe.state.lock().opens += 1;
        Ok(Opened {
            service: MemoryService::attach(&self.probe),
            closer: Arc::new(self.probe.clone()),
        })
    }
}
