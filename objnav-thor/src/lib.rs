pub mod frame;

use anyhow::{Result, anyhow};
use candle_core::Tensor;
use frame::frame_to_tensor;
use objnav_core::{
    actions::{Action, ActionRecord},
    env::{Environment, EnvironmentBuilder, EnvironmentSettings, ObjectMetadata},
    rng::seeded_rng,
};
use pyo3::{
    prelude::*,
    types::{PyBytes, PyDict},
};
use rand::{Rng, rngs::StdRng};
use tracing::{debug, warn};

struct RawFrame {
    bytes: Vec<u8>,
    height: usize,
    width: usize,
}

struct Observation {
    last_action_success: bool,
    objects: Vec<ObjectMetadata>,
    frame: RawFrame,
}

fn read_event(event: &Bound<'_, PyAny>) -> PyResult<Observation> {
    let metadata = event.getattr("metadata")?;
    let last_action_success: bool = metadata.get_item("lastActionSuccess")?.extract()?;
    let mut objects = vec![];
    for object in metadata.get_item("objects")?.try_iter()? {
        let object = object?;
        objects.push(ObjectMetadata {
            object_type: object.get_item("objectType")?.extract()?,
            visible: object.get_item("visible")?.extract()?,
        });
    }
    let frame = event.getattr("frame")?;
    let (height, width, _channels): (usize, usize, usize) = frame.getattr("shape")?.extract()?;
    let bytes = frame
        .call_method0("tobytes")?
        .downcast_into::<PyBytes>()?
        .as_bytes()
        .to_vec();
    Ok(Observation {
        last_action_success,
        objects,
        frame: RawFrame {
            bytes,
            height,
            width,
        },
    })
}

/// An AI2-THOR controller living in the embedded Python interpreter.
///
/// `Found` and `Done` are agent signals, not simulator actions: they never reach THOR and leave
/// the last observation in place.
pub struct ThorEnv {
    settings: EnvironmentSettings,
    controller: Option<PyObject>,
    rng: StdRng,
    placement_seed: i32,
    last_action_success: bool,
    objects: Vec<ObjectMetadata>,
    frame: Option<RawFrame>,
}

impl ThorEnv {
    pub fn new(settings: &EnvironmentSettings) -> Self {
        Self {
            settings: settings.clone(),
            controller: None,
            rng: seeded_rng(settings.seed),
            placement_seed: 0,
            last_action_success: true,
            objects: vec![],
            frame: None,
        }
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    fn controller(&self) -> Result<&PyObject> {
        self.controller
            .as_ref()
            .ok_or_else(|| anyhow!("THOR controller has not been started"))
    }

    fn observe(&mut self, observation: Observation) {
        self.last_action_success = observation.last_action_success;
        self.objects = observation.objects;
        self.frame = Some(observation.frame);
    }

    /// Shuts the simulator process down. The next `start` launches a new one.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(controller) = self.controller.take() {
            Python::with_gil(|py| controller.call_method0(py, "stop"))?;
        }
        Ok(())
    }
}

impl Drop for ThorEnv {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("failed to stop THOR controller: {err}");
        }
    }
}

impl Environment for ThorEnv {
    fn start(&mut self, scene: &str, gpu_id: Option<usize>) -> Result<()> {
        let [height, width] = self.settings.frame_size;
        let executable = self.settings.executable_path.to_string_lossy().into_owned();
        let controller = Python::with_gil(|py| {
            let module = py.import("ai2thor.controller")?;
            let kwargs = PyDict::new(py);
            kwargs.set_item("local_executable_path", &executable)?;
            kwargs.set_item("scene", scene)?;
            kwargs.set_item("gridSize", self.settings.grid_size)?;
            kwargs.set_item("fieldOfView", self.settings.fov)?;
            kwargs.set_item("width", width)?;
            kwargs.set_item("height", height)?;
            if let Some(gpu_id) = gpu_id {
                kwargs.set_item("x_display", format!("0.{gpu_id}"))?;
            }
            let controller = module.getattr("Controller")?.call((), Some(&kwargs))?;
            PyResult::Ok(controller.unbind())
        })?;
        debug!(scene, executable = %executable, "started THOR controller");
        self.controller = Some(controller);
        self.reset(scene, true)
    }

    fn reset(&mut self, scene: &str, reseed: bool) -> Result<()> {
        if reseed {
            self.placement_seed = self.rng.random_range(0..i32::MAX);
        }
        let randomize = self.settings.randomize_objects;
        let placement_seed = self.placement_seed;
        let controller = self.controller()?;
        let observation = Python::with_gil(|py| {
            let controller = controller.bind(py);
            let mut event = controller.call_method1("reset", (scene,))?;
            if randomize {
                let kwargs = PyDict::new(py);
                kwargs.set_item("action", "InitialRandomSpawn")?;
                kwargs.set_item("randomSeed", placement_seed)?;
                kwargs.set_item("forceVisible", true)?;
                event = controller.call_method("step", (), Some(&kwargs))?;
            }
            read_event(&event)
        })?;
        self.observe(observation);
        Ok(())
    }

    fn step(&mut self, action: &ActionRecord) -> Result<()> {
        if matches!(action.action, Action::Found | Action::Done) {
            self.last_action_success = true;
            return Ok(());
        }
        let controller = self.controller()?;
        let observation = Python::with_gil(|py| {
            let kwargs = PyDict::new(py);
            kwargs.set_item("action", action.action.as_str())?;
            let event = controller.bind(py).call_method("step", (), Some(&kwargs))?;
            read_event(&event)
        })?;
        self.observe(observation);
        Ok(())
    }

    fn last_action_success(&self) -> bool {
        self.last_action_success
    }

    fn objects(&self) -> &[ObjectMetadata] {
        &self.objects
    }

    fn current_frame(&self) -> Result<Tensor> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| anyhow!("no frame has been observed yet"))?;
        frame_to_tensor(
            &frame.bytes,
            frame.height,
            frame.width,
            self.settings.frame_size,
        )
    }
}

/// Builds [`ThorEnv`]s; the simulator itself only launches on `start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThorEnvBuilder;

impl EnvironmentBuilder for ThorEnvBuilder {
    type Env = ThorEnv;

    fn build_env(&self, settings: &EnvironmentSettings) -> Result<ThorEnv> {
        Ok(ThorEnv::new(settings))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use objnav_core::config::EpisodeConfig;

    #[test]
    fn nothing_reaches_the_simulator_before_start() -> Result<()> {
        let settings = EpisodeConfig::default().environment_settings(3);
        let mut env = ThorEnvBuilder.build_env(&settings)?;
        assert_eq!(env.settings().seed, 3);
        assert!(env.current_frame().is_err());
        assert!(env.objects().is_empty());
        assert!(env.step(&Action::MoveAhead.into()).is_err());
        assert!(env.reset("FloorPlan28", true).is_err());
        Ok(())
    }

    #[test]
    fn agent_signals_stay_local() -> Result<()> {
        let settings = EpisodeConfig::default().environment_settings(0);
        let mut env = ThorEnv::new(&settings);
        env.last_action_success = false;
        env.step(&Action::Found.into())?;
        assert!(env.last_action_success());
        env.step(&Action::Done.into())?;
        assert!(env.last_action_success());
        Ok(())
    }
}
