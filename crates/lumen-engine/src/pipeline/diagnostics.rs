use crate::device::ShaderStage;

/// Line number from a `VERTEX SHADER ERROR: 0:<line>:` style message.
pub fn error_line(message: &str, stage: ShaderStage) -> Option<usize> {
    let marker = match stage {
        ShaderStage::Vertex => "VERTEX SHADER ERROR: 0:",
        ShaderStage::Fragment => "FRAGMENT SHADER ERROR: 0:",
    };
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let end = rest.find(':')?;
    rest[..end].trim().parse().ok()
}

/// Stage, line number and text of the line a compile error points at.
pub fn offending_line(message: &str, vertex: &str, fragment: &str) -> Option<(ShaderStage, usize, String)> {
    [(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)]
        .into_iter()
        .find_map(|(stage, code)| {
            let line = error_line(message, stage)?;
            let text = code.lines().nth(line.checked_sub(1)?)?;
            Some((stage, line, text.to_string()))
        })
}

/// Everything logged when a program exhausts its fallbacks.
pub(crate) struct FailureReport<'a> {
    pub label: &'a str,
    pub message: &'a str,
    pub defines: &'a [String],
    pub attributes: &'a [String],
    pub uniforms: &'a [String],
    pub vertex: &'a str,
    pub fragment: &'a str,
}

impl FailureReport<'_> {
    pub fn log(&self) {
        log::error!("Unable to compile program {}", self.label);
        log::error!("Uniforms: {}", self.uniforms.join(", "));
        log::error!("Attributes: {}", self.attributes.join(", "));
        log::error!("Defines:\n{}", self.defines.join("\n"));
        if let Some((stage, line, text)) = offending_line(self.message, self.vertex, self.fragment) {
            log::error!("Offending line [{}] in {} code: {}", line, stage.as_str(), text);
        }
        log::error!("Error: {}", self.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_specific_line() {
        let msg = "FRAGMENT SHADER ERROR: 0:3: 'foo' : undeclared identifier";
        assert_eq!(error_line(msg, ShaderStage::Fragment), Some(3));
        assert_eq!(error_line(msg, ShaderStage::Vertex), None);
    }

    #[test]
    fn finds_offending_text() {
        let msg = "VERTEX SHADER ERROR: 0:2: '#error' : nope";
        let vs = "#version 300 es\n#error nope\nvoid main(){}";
        assert_eq!(
            offending_line(msg, vs, ""),
            Some((ShaderStage::Vertex, 2, "#error nope".to_string()))
        );
    }

    #[test]
    fn out_of_range_line_is_none() {
        assert_eq!(offending_line("VERTEX SHADER ERROR: 0:9: x", "a\nb", ""), None);
        assert_eq!(offending_line("link failed", "a", "b"), None);
    }
}
