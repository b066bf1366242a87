use std::collections::VecDeque;

use crate::error::{BuildError, ElementError};

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// An element start event with its attributes in document order. Names are local
/// names, so `xlink:href` is reported as `href`.
#[derive(Debug, Clone, PartialEq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl StartTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Numeric attribute, absent is `Ok(None)`.
    pub fn number(&self, name: &str) -> Result<Option<f32>, ElementError> {
        self.attr(name)
            .map(|value| parse_number(&self.name, name, value))
            .transpose()
    }

    pub fn required_number(&self, name: &'static str) -> Result<f32, ElementError> {
        let value = self.attr(name).ok_or_else(|| ElementError::MissingAttribute {
            element: self.name.clone(),
            attribute: name,
        })?;
        parse_number(&self.name, name, value)
    }

    pub fn required_attr(&self, name: &'static str) -> Result<&str, ElementError> {
        self.attr(name).ok_or_else(|| ElementError::MissingAttribute {
            element: self.name.clone(),
            attribute: name,
        })
    }
}

/// Parses a plain number, tolerating a trailing `px` unit.
pub(crate) fn parse_number(element: &str, attribute: &str, value: &str) -> Result<f32, ElementError> {
    let trimmed = value.trim();
    let digits = trimmed.strip_suffix("px").unwrap_or(trimmed).trim_end();
    match digits.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ElementError::InvalidNumber {
            element: element.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start(StartTag),
    End(String),
    Text(String),
}

/// The markup tokenizer seen from the builder: a forward-only stream of events.
pub trait EventSource {
    /// `Ok(None)` once the stream is exhausted or closed.
    fn next_event(&mut self) -> Result<Option<Event>, BuildError>;

    /// Releases the underlying resource. Calling it more than once is a no-op.
    fn close(&mut self);
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_event(&mut self) -> Result<Option<Event>, BuildError> {
        (**self).next_event()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Consumes events up to and including the end of the element `name` whose start
/// was just read. Nested elements of the same name are balanced.
pub(crate) fn skip_element(source: &mut dyn EventSource, name: &str) -> Result<(), BuildError> {
    let mut depth = 0usize;
    while let Some(event) = source.next_event()? {
        match event {
            Event::Start(tag) if tag.name == name => depth += 1,
            Event::End(end) if end == name => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Event source over an XML document tokenized by roxmltree.
pub struct XmlEventSource {
    events: Option<VecDeque<Event>>,
}

impl XmlEventSource {
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        let mut options = roxmltree::ParsingOptions::default();
        options.allow_dtd = true;
        let doc = roxmltree::Document::parse_with_options(text, options)
            .map_err(|err| BuildError::Decode(err.to_string()))?;

        let mut events = VecDeque::new();
        for child in doc.root().children() {
            push_node_events(child, &mut events);
        }
        Ok(Self {
            events: Some(events),
        })
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        let text = std::str::from_utf8(bytes).map_err(|err| BuildError::Decode(err.to_string()))?;
        Self::parse(text)
    }

    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: Some(events.into_iter().collect()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }
}

/// Start, children, end for elements; character data for text nodes. Comments and
/// processing instructions produce nothing.
fn push_node_events(node: roxmltree::Node<'_, '_>, events: &mut VecDeque<Event>) {
    if node.is_element() {
        let attributes = node
            .attributes()
            .map(|a| Attribute {
                name: a.name().to_string(),
                value: a.value().to_string(),
            })
            .collect();
        events.push_back(Event::Start(StartTag {
            name: node.tag_name().name().to_string(),
            attributes,
        }));
        for child in node.children() {
            push_node_events(child, events);
        }
        events.push_back(Event::End(node.tag_name().name().to_string()));
    } else if node.is_text() {
        if let Some(text) = node.text() {
            events.push_back(Event::Text(text.to_string()));
        }
    }
}

impl EventSource for XmlEventSource {
    fn next_event(&mut self) -> Result<Option<Event>, BuildError> {
        Ok(self.events.as_mut().and_then(|queue| queue.pop_front()))
    }

    fn close(&mut self) {
        self.events = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut XmlEventSource) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(ev) = source.next_event().expect("event") {
            out.push(ev);
        }
        out
    }

    #[test]
    fn emits_start_text_end_in_document_order() {
        let mut source =
            XmlEventSource::parse(r#"<svg id="a"><text font-size="12">Hi</text></svg>"#).unwrap();
        let events = drain(&mut source);
        assert_eq!(events.len(), 5);
        match &events[0] {
            Event::Start(tag) => {
                assert_eq!(tag.name, "svg");
                assert_eq!(tag.id(), Some("a"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events[2], Event::Text("Hi".to_string()));
        assert_eq!(events[3], Event::End("text".to_string()));
        assert_eq!(events[4], Event::End("svg".to_string()));
    }

    #[test]
    fn nested_elements_close_before_their_next_sibling() {
        let mut source = XmlEventSource::parse(
            "<svg><!-- note --><g><rect/></g><circle/></svg>",
        )
        .unwrap();
        let names: Vec<String> = drain(&mut source)
            .into_iter()
            .map(|ev| match ev {
                Event::Start(tag) => format!("+{}", tag.name),
                Event::End(name) => format!("-{}", name),
                Event::Text(text) => format!("'{}'", text),
            })
            .collect();
        assert_eq!(
            names,
            ["+svg", "+g", "+rect", "-rect", "-g", "+circle", "-circle", "-svg"]
        );
    }

    #[test]
    fn namespaced_attributes_use_local_names() {
        let mut source = XmlEventSource::parse(
            r##"<svg xmlns:xlink="http://www.w3.org/1999/xlink"><use xlink:href="#r"/></svg>"##,
        )
        .unwrap();
        let events = drain(&mut source);
        let Event::Start(tag) = &events[1] else {
            panic!("expected start tag");
        };
        assert_eq!(tag.attr("href"), Some("#r"));
    }

    #[test]
    fn doctype_is_accepted() {
        let text = r#"<?xml version="1.0"?>
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">
<svg/>"#;
        assert!(XmlEventSource::parse(text).is_ok());
    }

    #[test]
    fn malformed_markup_is_a_decode_error() {
        let err = XmlEventSource::parse("<svg><g></svg>").err().expect("error");
        assert!(matches!(err, BuildError::Decode(_)));
    }

    #[test]
    fn numbers_accept_px_and_reject_garbage() {
        let tag = StartTag::new("rect")
            .with_attr("width", "12.5px")
            .with_attr("height", "abc");
        assert_eq!(tag.number("width"), Ok(Some(12.5)));
        assert_eq!(tag.number("x"), Ok(None));
        assert!(matches!(
            tag.required_number("height"),
            Err(ElementError::InvalidNumber { .. })
        ));
        assert_eq!(
            tag.required_number("rx"),
            Err(ElementError::MissingAttribute {
                element: "rect".to_string(),
                attribute: "rx"
            })
        );
    }

    #[test]
    fn skip_element_balances_nested_names() {
        let mut source = XmlEventSource::parse("<svg><g><g><rect/></g></g><circle/></svg>").unwrap();
        source.next_event().unwrap();
        source.next_event().unwrap();
        skip_element(&mut source, "g").unwrap();
        match source.next_event().unwrap() {
            Some(Event::Start(tag)) => assert_eq!(tag.name, "circle"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn close_is_idempotent_and_ends_the_stream() {
        let mut source = XmlEventSource::parse("<svg><g/></svg>").unwrap();
        source.close();
        source.close();
        assert!(source.is_closed());
        assert_eq!(source.next_event().unwrap(), None);
    }
}
