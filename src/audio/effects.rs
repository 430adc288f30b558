use tracing::debug;

pub trait AudioEffects {
    fn name(&self) -> &'static str;
    fn set_virtualizer(&mut self, enabled: bool) -> bool;
    fn set_bass_boost(&mut self, enabled: bool) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedEffects;

impl AudioEffects for UnsupportedEffects {
    fn name(&self) -> &'static str {
        "none"
    }

    fn set_virtualizer(&mut self, enabled: bool) -> bool {
        debug!(enabled, "virtualizer requested on an output without effects");
        false
    }

    fn set_bass_boost(&mut self, enabled: bool) -> bool {
        debug!(enabled, "bass boost requested on an output without effects");
        false
    }
}

pub fn effects_for_platform() -> Box<dyn AudioEffects> {
    // Virtualizer and bass boost are session effects of the Android media
    // stack; desktop outputs have no equivalent.
    Box::new(UnsupportedEffects)
}
