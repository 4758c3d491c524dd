use std::fmt;
use std::str::FromStr;

use super::{IdfDocument, IdfError, IdfObject};

/// Column where the pretty printer starts field labels.
const LABEL_COLUMN: usize = 29;

impl FromStr for IdfDocument {
    type Err = IdfError;

    /// Parse IDF text. `!` starts a comment running to the end of the line,
    /// fields are separated by `,` and objects end with `;`. Whitespace
    /// around fields is not significant.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut objects = Vec::new();
        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut object_line = 1;

        for (number, line) in text.lines().enumerate() {
            let line = line.split('!').next().unwrap_or_default();
            for c in line.chars() {
                if tokens.is_empty() && current.trim().is_empty() && !c.is_whitespace() {
                    object_line = number + 1;
                }
                match c {
                    ',' => tokens.push(std::mem::take(&mut current).trim().to_string()),
                    ';' => {
                        tokens.push(std::mem::take(&mut current).trim().to_string());
                        let mut fields = std::mem::take(&mut tokens).into_iter();
                        let class = fields.next().unwrap_or_default();
                        if class.is_empty() {
                            return Err(IdfError::Syntax {
                                line: object_line,
                                message: "object has no class name".into(),
                            });
                        }
                        objects.push(IdfObject {
                            class,
                            fields: fields.collect(),
                        });
                    }
                    _ => current.push(c),
                }
            }
            current.push('\n');
        }

        if !tokens.is_empty() || !current.trim().is_empty() {
            return Err(IdfError::Syntax {
                line: object_line,
                message: "object is not terminated with ';'".into(),
            });
        }
        Ok(IdfDocument { objects })
    }
}

impl IdfDocument {
    /// One object per line, no comments.
    pub fn to_dense_string(&self) -> String {
        let mut out = String::new();
        for object in &self.objects {
            out.push_str(&object.class);
            for field in &object.fields {
                out.push(',');
                out.push_str(field);
            }
            out.push_str(";\n");
        }
        out
    }
}

/// One field per line with its label as a comment, the layout EnergyPlus
/// tools write.
impl fmt::Display for IdfDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for object in &self.objects {
            if object.fields.is_empty() {
                writeln!(f, "{};", object.class)?;
            } else {
                writeln!(f, "{},", object.class)?;
            }
            for (index, field) in object.fields.iter().enumerate() {
                let separator = if index + 1 == object.fields.len() { ';' } else { ',' };
                let value = format!("    {field}{separator}");
                writeln!(
                    f,
                    "{value:<width$} !- {}",
                    object.label(index),
                    width = LABEL_COLUMN
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_with_comments_and_whitespace() {
        let text = "
            ! a comment line
            Zone,
              Office,     !- Name
              0;          !- Direction of Relative North

            Timestep,4;
        ";
        let document: IdfDocument = text.parse().unwrap();
        assert_eq!(
            document.objects,
            vec![
                IdfObject::new("Zone", ["Office", "0"]),
                IdfObject::new("Timestep", ["4"]),
            ]
        );
    }

    #[test]
    fn blank_fields_are_kept() {
        let document: IdfDocument = "RunPeriod,Run,1,1,,12,31,;".parse().unwrap();
        let object = &document.objects[0];
        assert_eq!(object.fields.len(), 7);
        assert_eq!(object.field(3), None);
        assert_eq!(object.get("End Month"), Some("12"));
    }

    #[test]
    fn object_without_fields() {
        let document: IdfDocument = "Output:Surfaces:Drawing;".parse().unwrap();
        assert_eq!(document.objects[0].fields, Vec::<String>::new());
    }

    #[test]
    fn unterminated_object() {
        let error = "Version,23.2;\n\nZone,\n  Office,\n  0"
            .parse::<IdfDocument>()
            .unwrap_err();
        assert_matches!(error, IdfError::Syntax { line: 3, .. });
    }

    #[test]
    fn missing_class_name() {
        let error = "Version,23.2;\n , Office;".parse::<IdfDocument>().unwrap_err();
        assert_matches!(error, IdfError::Syntax { line: 2, .. });
    }

    #[test]
    fn pretty_output_has_labels() {
        let document = IdfDocument {
            objects: vec![IdfObject::new("Building", ["Demo", "15", "City"])],
        };
        let text = document.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Building,");
        assert_eq!(lines[1].trim_end(), format!("{:<29} !- Name", "    Demo,"));
        assert!(lines[3].starts_with("    City;"));
        assert!(lines[3].ends_with("!- Terrain"));
    }

    #[test]
    fn pretty_and_dense_forms_parse_the_same() {
        let document = IdfDocument {
            objects: vec![
                IdfObject::new("Version", ["23.2"]),
                IdfObject::new("Construction", ["Office/Wall", "Brick", "Insulation"]),
                IdfObject::new("Output:Diagnostics", ["DisplayExtraWarnings"]),
                IdfObject::new("Output:Surfaces:Drawing", Vec::<String>::new()),
                IdfObject::new("RunPeriod", ["Run", "1", "1", "", "12", "31"]),
            ],
        };
        let pretty: IdfDocument = document.to_string().parse().unwrap();
        let dense: IdfDocument = document.to_dense_string().parse().unwrap();
        assert_eq!(pretty, document);
        assert_eq!(dense, document);
    }
}
