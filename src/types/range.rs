use bytes::{BufMut, BytesMut};
use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type};

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

/// A PostgreSQL range value. A missing bound is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range<T> {
    lower: Option<T>,
    upper: Option<T>,
    lower_inc: bool,
    upper_inc: bool,
    empty: bool,
}

impl<T> Range<T> {
    /// Half-open range `[lower, upper)`, the canonical form for discrete types.
    pub fn new(lower: Option<T>, upper: Option<T>) -> Self {
        Self::with_bounds(lower, upper, true, false)
    }

    pub fn with_bounds(lower: Option<T>, upper: Option<T>, lower_inc: bool, upper_inc: bool) -> Self {
        Self {
            lower_inc: lower_inc && lower.is_some(),
            upper_inc: upper_inc && upper.is_some(),
            lower,
            upper,
            empty: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            lower: None,
            upper: None,
            lower_inc: false,
            upper_inc: false,
            empty: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn lower(&self) -> Option<&T> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&T> {
        self.upper.as_ref()
    }

    pub fn lower_inc(&self) -> bool {
        self.lower_inc
    }

    pub fn upper_inc(&self) -> bool {
        self.upper_inc
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Range<U> {
        Range {
            lower: self.lower.map(&mut f),
            upper: self.upper.map(&mut f),
            lower_inc: self.lower_inc,
            upper_inc: self.upper_inc,
            empty: self.empty,
        }
    }

    fn flags(&self) -> u8 {
        if self.empty {
            return RANGE_EMPTY;
        }
        let mut flags = 0;
        if self.lower_inc {
            flags |= RANGE_LB_INC;
        }
        if self.upper_inc {
            flags |= RANGE_UB_INC;
        }
        if self.lower.is_none() {
            flags |= RANGE_LB_INF;
        }
        if self.upper.is_none() {
            flags |= RANGE_UB_INF;
        }
        flags
    }
}

/// `[lo,hi)` style text, or `empty`.
impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            return write!(f, "empty");
        }
        write!(f, "{}", if self.lower_inc { '[' } else { '(' })?;
        if let Some(lower) = &self.lower {
            write!(f, "{}", lower)?;
        }
        write!(f, ",")?;
        if let Some(upper) = &self.upper {
            write!(f, "{}", upper)?;
        }
        write!(f, "{}", if self.upper_inc { ']' } else { ')' })
    }
}

impl<T: fmt::Display> Serialize for Range<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn element_type(ty: &Type) -> Result<&Type, Box<dyn StdError + Sync + Send>> {
    match ty.kind() {
        Kind::Range(element) => Ok(element),
        _ => Err(format!("{} is not a range type", ty).into()),
    }
}

fn write_bound<T: ToSql>(
    bound: &T,
    element: &Type,
    out: &mut BytesMut,
) -> Result<(), Box<dyn StdError + Sync + Send>> {
    let base = out.len();
    out.put_i32(0);
    if let IsNull::Yes = bound.to_sql_checked(element, out)? {
        return Err("range bounds cannot be NULL".into());
    }
    let len = i32::try_from(out.len() - base - 4)?;
    out[base..base + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

impl<T: ToSql> ToSql for Range<T> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let element = element_type(ty)?;
        out.put_u8(self.flags());
        if !self.empty {
            if let Some(lower) = &self.lower {
                write_bound(lower, element, out)?;
            }
            if let Some(upper) = &self.upper {
                write_bound(upper, element, out)?;
            }
        }
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        match ty.kind() {
            Kind::Range(element) => T::accepts(element),
            _ => false,
        }
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        if !<Self as ToSql>::accepts(ty) {
            return Err(format!("cannot encode a range as {}", ty).into());
        }
        self.to_sql(ty, out)
    }
}

fn read_bound<'a, T: FromSql<'a>>(
    element: &Type,
    raw: &mut &'a [u8],
) -> Result<T, Box<dyn StdError + Sync + Send>> {
    if raw.len() < 4 {
        return Err("truncated range bound".into());
    }
    let len = i32::from_be_bytes(raw[0..4].try_into()?);
    let len = usize::try_from(len).map_err(|_| "range bounds cannot be NULL")?;
    if raw.len() < 4 + len {
        return Err("truncated range bound".into());
    }
    let value = T::from_sql(element, &raw[4..4 + len])?;
    *raw = &raw[4 + len..];
    Ok(value)
}

impl<'a, T: FromSql<'a>> FromSql<'a> for Range<T> {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let element = element_type(ty)?;
        let (&flags, mut rest) = raw.split_first().ok_or("empty range payload")?;
        if flags & RANGE_EMPTY != 0 {
            return Ok(Range::empty());
        }
        let lower = if flags & RANGE_LB_INF == 0 {
            Some(read_bound(element, &mut rest)?)
        } else {
            None
        };
        let upper = if flags & RANGE_UB_INF == 0 {
            Some(read_bound(element, &mut rest)?)
        } else {
            None
        };
        Ok(Range::with_bounds(
            lower,
            upper,
            flags & RANGE_LB_INC != 0,
            flags & RANGE_UB_INC != 0,
        ))
    }

    fn accepts(ty: &Type) -> bool {
        match ty.kind() {
            Kind::Range(element) => T::accepts(element),
            _ => false,
        }
    }
}
