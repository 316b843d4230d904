use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

/// Cell index to cell voltage in millivolts.
pub type CellVoltages = BTreeMap<u8, u16>;

/// Every value type a data point may carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    I16(i16),
    I32(i32),
    Text(String),
    Cells(CellVoltages),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    U8,
    U16,
    U32,
    I16,
    I32,
    Text,
    Cells,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::Text(_) => ValueKind::Text,
            Value::Cells(_) => ValueKind::Cells,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => f.write_str(if *v { "yes" } else { "no" }),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Cells(cells) => {
                f.write_str("(")?;
                let mut sep = "";
                for (idx, mv) in cells {
                    write!(f, "{}{}={}", sep, idx, mv)?;
                    sep = ", ";
                }
                f.write_str(")")
            }
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// Rust types that may be stored in a data point. Sealed, so the set of
/// value types stays in lockstep with [`Value`].
pub trait DataPointValue: private::Sealed + Clone + PartialEq + fmt::Debug + Sized {
    const KIND: ValueKind;

    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_data_point_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl DataPointValue for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_data_point_value! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i16 => I16,
    i32 => I32,
    String => Text,
    CellVoltages => Cells,
}

/// A vendor's closed set of labels together with its name/unit/type table.
///
/// Implemented by the enums generated through [`datapoint_labels!`].
pub trait LabelSet: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn unit(&self) -> &'static str;
    fn kind(&self) -> ValueKind;
}

/// Compile-time handle for one label. `Type` is the only value type
/// [`DataPointContainer::add`] accepts for it.
pub trait Label {
    type Set: LabelSet;
    type Type: DataPointValue;

    const LABEL: Self::Set;
}

/// One decoded measurement.
///
/// Two data points compare equal when their values are equal; name, unit
/// and timestamp do not take part.
#[derive(Clone, Debug)]
pub struct DataPoint {
    label_text: &'static str,
    value_text: String,
    unit_text: &'static str,
    value: Value,
    timestamp: u32,
}

impl DataPoint {
    pub fn new(label_text: &'static str, unit_text: &'static str, value: Value, timestamp: u32) -> Self {
        Self {
            label_text,
            value_text: value.to_string(),
            unit_text,
            value,
            timestamp,
        }
    }

    pub fn label_text(&self) -> &str {
        self.label_text
    }

    pub fn value_text(&self) -> &str {
        &self.value_text
    }

    pub fn unit_text(&self) -> &str {
        self.unit_text
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }
}

impl PartialEq for DataPoint {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}{}", self.label_text, self.value_text, self.unit_text)
    }
}

/// Typed label to data point map.
///
/// Values go in through [`add`](Self::add), which only accepts the type
/// declared for the label:
///
/// ```compile_fail
/// use bms_bridge::jk::datapoints::{label, DataPointContainer};
///
/// let mut dp = DataPointContainer::new();
/// // BatteryCellAmount is declared as u16
/// dp.add::<label::BatteryCellAmount>(16u8, 0);
/// ```
#[derive(Clone, Debug)]
pub struct DataPointContainer<S: LabelSet> {
    data_points: HashMap<S, DataPoint>,
}

impl<S: LabelSet> Default for DataPointContainer<S> {
    fn default() -> Self {
        Self {
            data_points: HashMap::new(),
        }
    }
}

impl<S: LabelSet> DataPointContainer<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the value for label `L`, replacing any previous entry.
    pub fn add<L>(&mut self, value: L::Type, timestamp: u32)
    where
        L: Label<Set = S>,
    {
        let label = L::LABEL;
        let data_point = DataPoint::new(label.name(), label.unit(), value.into_value(), timestamp);
        self.data_points.insert(label, data_point);
    }

    pub fn get<L>(&self) -> Option<L::Type>
    where
        L: Label<Set = S>,
    {
        self.data_points
            .get(&L::LABEL)
            .and_then(|dp| L::Type::from_value(&dp.value))
    }

    pub fn data_point_for<L>(&self) -> Option<&DataPoint>
    where
        L: Label<Set = S>,
    {
        self.data_points.get(&L::LABEL)
    }

    pub fn get_data_point(&self, label: S) -> Option<&DataPoint> {
        self.data_points.get(&label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, &DataPoint)> {
        self.data_points.iter()
    }

    pub fn len(&self) -> usize {
        self.data_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_points.is_empty()
    }

    /// Folds `source` into this container. Entries whose value did not
    /// change keep their original timestamp; everything else is replaced by
    /// the entry from `source`.
    pub fn merge_from(&mut self, source: &Self) {
        for (label, data_point) in source.iter() {
            if self.data_points.get(label) == Some(data_point) {
                continue;
            }
            self.data_points.insert(*label, data_point.clone());
        }
    }
}

/// Declares a vendor label set.
///
/// Generates the label enum, its [`LabelSet`] implementation (name, unit and
/// value type per label, one exhaustive match each), an `ALL` slice and a
/// `label` module holding one zero-sized [`Label`] marker per variant.
#[macro_export]
macro_rules! datapoint_labels {
    (
        $(#[$meta:meta])*
        $vis:vis enum $set:ident : $repr:ident {
            $( $label:ident $(= $code:literal)? => ($ty:ty, $unit:literal), )*
        }
    ) => {
        #[repr($repr)]
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $set {
            $( $label $(= $code)?, )*
        }

        impl $set {
            pub const ALL: &'static [$set] = &[ $( $set::$label, )* ];
        }

        impl $crate::datapoints::LabelSet for $set {
            fn name(&self) -> &'static str {
                match self {
                    $( $set::$label => stringify!($label), )*
                }
            }

            fn unit(&self) -> &'static str {
                match self {
                    $( $set::$label => $unit, )*
                }
            }

            fn kind(&self) -> $crate::datapoints::ValueKind {
                match self {
                    $( $set::$label => <$ty as $crate::datapoints::DataPointValue>::KIND, )*
                }
            }
        }

        impl std::fmt::Display for $set {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::datapoints::LabelSet::name(self))
            }
        }

        pub mod label {
            #[allow(unused_imports)]
            use super::*;

            $(
                #[derive(Clone, Copy, Debug)]
                pub struct $label;

                impl $crate::datapoints::Label for $label {
                    type Set = super::$set;
                    type Type = $ty;

                    const LABEL: super::$set = super::$set::$label;
                }
            )*
        }
    };
}
