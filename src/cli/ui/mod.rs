mod device_view;
mod inspect_view;
mod listen_view;
mod painter;
mod spinner;
mod table;

pub(crate) use self::inspect_view::InspectReportView;
pub(crate) use self::listen_view::{
    DecodeErrorLineView, ListenReadyView, ListenSummaryView, ReportLineView,
};
pub(crate) use self::painter::Painter;
pub(crate) use self::spinner::Spinner;
