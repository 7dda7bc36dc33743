//! Source template parsing and rendering
//!
//! Templates use `{name}` placeholders, the same expansion style as command
//! placeholders elsewhere. `{{` and `}}` produce literal braces, which C++
//! templates need for function bodies.

use std::borrow::Cow;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::synth::TemplateError;
use crate::types::Submission;

/// Template used when no `template_path` is configured
pub const DEFAULT_TEMPLATE: &str = "#include \"fiddle_main.h\"
DrawOptions GetDrawOptions() {{
    return DrawOptions({width}, {height}, {raster}, {gpu}, {pdf}, {source});
}}
{code}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Width,
    Height,
    Raster,
    Gpu,
    Pdf,
    Source,
    Code,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "width" => Self::Width,
            "height" => Self::Height,
            "raster" => Self::Raster,
            "gpu" => Self::Gpu,
            "pdf" => Self::Pdf,
            "source" => Self::Source,
            "code" => Self::Code,
            _ => return None,
        })
    }

    fn value(self, submission: &Submission) -> Cow<'_, str> {
        let options = &submission.options;
        match self {
            Self::Width => options.width.to_string().into(),
            Self::Height => options.height.to_string().into(),
            Self::Raster => options.raster.to_string().into(),
            Self::Gpu => options.gpu.to_string().into(),
            Self::Pdf => options.pdf.to_string().into(),
            Self::Source => options.source_arg().into(),
            Self::Code => submission.code.as_str().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed source template.
///
/// Parsing guarantees that `{code}` appears exactly once and is the last
/// segment, so rendered output always ends with the submission's code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if chars.peek().is_some_and(|&(_, next)| next == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|&(_, next)| next == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed { offset });
                    }
                    let field = Field::from_name(&name)
                        .ok_or(TemplateError::UnknownPlaceholder { name, offset })?;
                    if field == Field::Code
                        && segments.contains(&Segment::Field(Field::Code))
                    {
                        return Err(TemplateError::DuplicateCode);
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(TemplateError::UnmatchedClose { offset }),
                _ => literal.push(ch),
            }
        }

        if !segments.contains(&Segment::Field(Field::Code)) {
            return Err(TemplateError::MissingCode);
        }
        // Whitespace after {code} (typically the file's final newline) is dropped
        if !literal.trim().is_empty() || segments.last() != Some(&Segment::Field(Field::Code)) {
            return Err(TemplateError::TextAfterCode);
        }

        Ok(Self { segments })
    }

    /// Render the template for `submission` into `writer`
    pub async fn render<W>(&self, submission: &Submission, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => writer.write_all(text.as_bytes()).await?,
                Segment::Field(field) => {
                    writer.write_all(field.value(submission).as_bytes()).await?
                }
            }
        }
        Ok(())
    }

    /// Render the template into a string
    pub async fn render_to_string(&self, submission: &Submission) -> std::io::Result<String> {
        let mut buffer = Vec::new();
        self.render(submission, &mut buffer).await?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::parse(DEFAULT_TEMPLATE).expect("built-in template should be valid")
    }
}
