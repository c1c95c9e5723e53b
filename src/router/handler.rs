//! Handler routing.
//!
//! A handler is addressed as `element.handler`. Every element answers the
//! generic read handlers below; everything else goes to the element's own
//! `read_handler` / `write_handler`.

use crate::router::element::{Element, HandlerSpec};
use crate::router::error::{HandlerError, HandlerKind};
use crate::router::executor::Router;
use crate::router::id::ElementId;
use crate::router::port::PortDirection;

/// Read handlers every element has.
pub const GENERIC_HANDLERS: &[HandlerSpec] = &[
    HandlerSpec::read("name"),
    HandlerSpec::read("class"),
    HandlerSpec::read("config"),
    HandlerSpec::read("ports"),
    HandlerSpec::read("processing"),
    HandlerSpec::read("handlers"),
];

/// Split `element.handler` at the last dot.
pub fn parse_path(path: &str) -> Result<(&str, &str), HandlerError> {
    match path.rsplit_once('.') {
        Some((element, handler)) if !element.is_empty() && !handler.is_empty() => {
            Ok((element, handler))
        }
        _ => Err(HandlerError::BadPath(path.to_string())),
    }
}

fn find_spec<'a>(specs: &'a [HandlerSpec], name: &str) -> Option<&'a HandlerSpec> {
    specs.iter().find(|spec| spec.name == name)
}

impl Router {
    /// Call a read handler.
    pub fn read_handler(&self, path: &str) -> Result<String, HandlerError> {
        let (element_name, handler) = parse_path(path)?;
        let id = self
            .element_id(element_name)
            .ok_or_else(|| HandlerError::NoSuchElement(element_name.to_string()))?;

        if let Some(value) = self.generic_read(id, handler) {
            return Ok(value);
        }

        if self.is_running(id) {
            return Err(HandlerError::Busy(element_name.to_string()));
        }
        let element = self
            .element_dyn(id)
            .ok_or_else(|| HandlerError::NoSuchElement(element_name.to_string()))?;

        let no_such = || HandlerError::NoSuchHandler {
            element: element_name.to_string(),
            handler: handler.to_string(),
            kind: HandlerKind::Read,
        };
        match find_spec(element.handlers(), handler) {
            Some(spec) if spec.read => element.read_handler(handler).ok_or_else(no_such),
            _ => Err(no_such()),
        }
    }

    /// Call a write handler.
    pub fn write_handler(&mut self, path: &str, value: &str) -> Result<(), HandlerError> {
        let (element_name, handler) = parse_path(path)?;
        let id = self
            .element_id(element_name)
            .ok_or_else(|| HandlerError::NoSuchElement(element_name.to_string()))?;

        if self.is_running(id) {
            return Err(HandlerError::Busy(element_name.to_string()));
        }
        let writable = self
            .element_dyn(id)
            .and_then(|element| find_spec(element.handlers(), handler))
            .is_some_and(|spec| spec.write);
        if !writable {
            return Err(HandlerError::NoSuchHandler {
                element: element_name.to_string(),
                handler: handler.to_string(),
                kind: HandlerKind::Write,
            });
        }

        tracing::debug!("write handler {} = {:?}", path, value);
        self.call_element(id, |element, ctx| {
            element.write_handler(ctx, handler, value.trim())
        })
        .unwrap_or_else(|| Err(HandlerError::Busy(element_name.to_string())))
    }

    /// Every handler `element` answers, generic ones first.
    pub fn handler_names(&self, element: ElementId) -> Vec<HandlerSpec> {
        let mut specs = GENERIC_HANDLERS.to_vec();
        if let Some(e) = self.element_dyn(element) {
            specs.extend_from_slice(e.handlers());
        }
        specs
    }

    fn generic_read(&self, id: ElementId, handler: &str) -> Option<String> {
        let value = match handler {
            "name" => self.element_name(id)?.to_string(),
            "class" => self.element_class(id)?.to_string(),
            "config" => self
                .element_args(id)?
                .iter()
                .map(|arg| arg.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "ports" => self.describe_ports(id),
            "processing" => match self.element_dyn(id) {
                Some(element) => element.processing().to_string(),
                None => return None,
            },
            "handlers" => self
                .handler_names(id)
                .iter()
                .map(|spec| {
                    let mode = match (spec.read, spec.write) {
                        (true, true) => "rw",
                        (true, false) => "r",
                        _ => "w",
                    };
                    format!("{}\t{}", spec.name, mode)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => return None,
        };
        Some(value)
    }

    /// Resolved port modes as `inputs/outputs`, e.g. `h/ll`. Before
    /// resolution the declared port counts are shown instead.
    fn describe_ports(&self, id: ElementId) -> String {
        match self.plan() {
            Some(plan) => format!(
                "{}/{}",
                plan.port_codes(id, PortDirection::Input),
                plan.port_codes(id, PortDirection::Output)
            ),
            None => self
                .element_dyn(id)
                .map(|element| element.port_count().to_string())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::args::Args;
    use crate::router::element::ElementContext;
    use crate::router::port::ProcessingSpec;

    #[derive(Default)]
    struct Knob {
        level: u32,
    }

    impl Element for Knob {
        fn class_name(&self) -> &'static str {
            "Knob"
        }

        fn port_count(&self) -> crate::router::port::PortCount {
            crate::router::port::PortCount::new(
                crate::router::port::PortRange::fixed(0),
                crate::router::port::PortRange::fixed(0),
            )
        }

        fn processing(&self) -> ProcessingSpec {
            ProcessingSpec::PUSH
        }

        fn handlers(&self) -> &'static [HandlerSpec] {
            const HANDLERS: &[HandlerSpec] = &[HandlerSpec::read_write("level"), HandlerSpec::read("secret")];
            HANDLERS
        }

        fn read_handler(&self, name: &str) -> Option<String> {
            match name {
                "level" => Some(self.level.to_string()),
                _ => None,
            }
        }

        fn write_handler(
            &mut self,
            _ctx: &mut ElementContext<'_>,
            name: &str,
            value: &str,
        ) -> Result<(), HandlerError> {
            match name {
                "level" => {
                    self.level = value
                        .parse()
                        .map_err(|_| HandlerError::BadValue(format!("level: expected an integer, got {value:?}")))?;
                    Ok(())
                }
                _ => Err(HandlerError::BadValue(format!("{name} is not writable"))),
            }
        }
    }

    fn router() -> Router {
        let mut router = Router::default();
        router
            .add_element("k", Box::new(Knob::default()), Args::empty())
            .unwrap();
        router.initialize().unwrap();
        router
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("c.count").unwrap(), ("c", "count"));
        assert_eq!(parse_path("a.b.count").unwrap(), ("a.b", "count"));
        assert!(matches!(parse_path("count"), Err(HandlerError::BadPath(_))));
        assert!(matches!(parse_path(".count"), Err(HandlerError::BadPath(_))));
        assert!(matches!(parse_path("c."), Err(HandlerError::BadPath(_))));
    }

    #[test]
    fn test_generic_handlers() {
        let router = router();
        assert_eq!(router.read_handler("k.name").unwrap(), "k");
        assert_eq!(router.read_handler("k.class").unwrap(), "Knob");
        assert_eq!(router.read_handler("k.config").unwrap(), "");
        assert_eq!(router.read_handler("k.ports").unwrap(), "/");
        assert_eq!(router.read_handler("k.processing").unwrap(), "h/h");
        let handlers = router.read_handler("k.handlers").unwrap();
        assert!(handlers.contains("level\trw"));
        assert!(handlers.starts_with("name\tr"));
    }

    #[test]
    fn test_element_handlers_round_trip() {
        let mut router = router();
        router.write_handler("k.level", " 7\n").unwrap();
        assert_eq!(router.read_handler("k.level").unwrap(), "7");
        assert!(matches!(
            router.write_handler("k.level", "high"),
            Err(HandlerError::BadValue(_))
        ));
    }

    #[test]
    fn test_unknown_element_and_handler() {
        let mut router = router();
        assert_eq!(
            router.read_handler("nobody.count"),
            Err(HandlerError::NoSuchElement("nobody".into()))
        );
        assert!(matches!(
            router.read_handler("k.missing"),
            Err(HandlerError::NoSuchHandler { kind: HandlerKind::Read, .. })
        ));
        assert!(matches!(
            router.write_handler("k.name", "x"),
            Err(HandlerError::NoSuchHandler { kind: HandlerKind::Write, .. })
        ));
        assert!(matches!(
            router.read_handler("k.secret"),
            Err(HandlerError::NoSuchHandler { .. })
        ));
    }
}
