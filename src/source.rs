//! Tracking of original source locations.
//!
//! Every object built by the front end keeps a position or a range of
//! positions in the original source text, so that any failure, at any
//! level of abstraction, can be traced back to an exact line and column.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    iter,
    ops::Range,
    rc::Rc,
};

/// Width of tab stops.
const TAB_STOP: u32 = 4;

/// An input stream, character by character.
pub trait InputStream: Iterator<Item = Result<(char, Location), io::Error>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Location), io::Error>> {}

/// Any value with an associated source location.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Gets the value.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Gets the location.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Discards the location and takes ownership of the value.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Splits into both parts.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Builds from a value and a location.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforms the value, keeping the same location.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// A location is made of an origin and a range of positions.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Joins a range of locations. Both are assumed to share an origin.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Start position.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// End position (exclusive).
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Origin of this location.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end.line != start.line || end == start.advance() {
            // A single column
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// A line-column position in a file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Line number, starting at 1.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Column number, starting at 1.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Moves to the next column.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Moves to the previous column.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.max(2) - 1,
        }
    }

    /// Moves to column 1 of the next line.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Moves to the next tab stop.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Turns a buffered reader into a character stream.
///
/// The location in the returned tuple is the one that belongs to the
/// first character of the output. Each emitted character carries the
/// location of the character that follows it.
pub fn consume<R, S>(reader: R, name: S) -> (Location, impl InputStream)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let start = Location {
        from: Rc::clone(&source),
        position: Position::default()..Position::default().advance(),
    };

    let chars = reader
        .lines()
        .enumerate()
        .flat_map(move |(line_index, line)| {
            let source = Rc::clone(&source);

            Fallible::new(line.map(move |line| {
                let line_chars: Vec<_> = line.chars().collect();
                source.lines.borrow_mut().push(line);

                let mut column = 1;
                line_chars
                    .into_iter()
                    .chain(iter::once('\n'))
                    .map(move |c| {
                        let here = Position {
                            line: line_index as u32 + 1,
                            column,
                        };

                        let next = match c {
                            '\n' => here.newline(),
                            '\t' => here.tab(),
                            _ => here.advance(),
                        };

                        column = next.column;
                        let location = Location {
                            from: Rc::clone(&source),
                            position: next..next.advance(),
                        };

                        (c, location)
                    })
            }))
        })
        .fuse();

    (start, chars)
}

/// Origin name and the lines read so far.
pub struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    /// Origin name, usually a path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `f` over a line that has already been read.
    ///
    /// Lines past the end of input are presented as empty.
    pub fn with_line<F, T>(&self, line: u32, f: F) -> T
    where
        F: FnOnce(&str) -> T,
    {
        let lines = self.lines.borrow();
        let text = (line as usize)
            .checked_sub(1)
            .and_then(|index| lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        f(text)
    }
}

/// An iterator that either emits a single error or wraps the outputs
/// of another iterator in `Ok`, but never both.
struct Fallible<I, E>(Result<I, iter::Once<E>>);

impl<I, E> Fallible<I, E> {
    fn new(result: Result<I, E>) -> Self {
        Fallible(result.map_err(iter::once))
    }
}

impl<I: Iterator, E> Iterator for Fallible<I, E> {
    type Item = Result<I::Item, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Ok(ok) => ok.next().map(Ok),
            Err(error) => error.next().map(Err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lines_and_columns() {
        let (start, stream) = consume("ab\n\tc".as_bytes(), "<test>");
        assert_eq!(start.start(), Position::default());

        let chars: Vec<_> = stream.map(Result::unwrap).collect();
        let text: String = chars.iter().map(|(c, _)| *c).collect();
        assert_eq!(text, "ab\n\tc\n");

        // Each character carries the position of the one after it
        let (_, after_tab) = &chars[3];
        assert_eq!(after_tab.start().line(), 2);
        assert_eq!(after_tab.start().column(), 5);
    }

    #[test]
    fn keeps_read_lines_for_excerpts() {
        let (start, stream) = consume("first\nsecond\r\n".as_bytes(), "<test>");
        stream.for_each(drop);

        let source = start.source();
        assert_eq!(source.name(), "<test>");
        assert_eq!(source.with_line(2, str::to_owned), "second");
        assert_eq!(source.with_line(7, str::len), 0);
    }
}
