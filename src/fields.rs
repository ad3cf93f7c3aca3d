//! Reference names of the work item fields bound by the built-in types.
//!
//! See the Azure Boards field index for the full list of system and process fields.

pub const ID: &str = "System.Id";
pub const TITLE: &str = "System.Title";
pub const STATE: &str = "System.State";
pub const TAGS: &str = "System.Tags";
pub const DESCRIPTION: &str = "System.Description";
pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
pub const ASSIGNED_TO: &str = "System.AssignedTo";
pub const ACCEPTED_BY: &str = "Microsoft.VSTS.CodeReview.AcceptedBy";
pub const STACK_RANK: &str = "Microsoft.VSTS.Common.StackRank";
pub const ITERATION_PATH: &str = "System.IterationPath";
pub const ITERATION_ID: &str = "System.IterationId";
pub const AREA_PATH: &str = "System.AreaPath";
pub const AREA_ID: &str = "System.AreaId";
pub const CHANGED_DATE: &str = "System.ChangedDate";
pub const CHANGED_BY: &str = "System.ChangedBy";
pub const STATE_CHANGED_DATE: &str = "Microsoft.VSTS.Common.StateChangeDate";
pub const CLOSED_BY: &str = "Microsoft.VSTS.Common.ClosedBy";
pub const CLOSED_DATE: &str = "Microsoft.VSTS.Common.ClosedDate";
pub const HISTORY: &str = "System.History";
pub const CREATED_DATE: &str = "System.CreatedDate";
pub const CREATED_BY: &str = "System.CreatedBy";
pub const PROJECT: &str = "System.TeamProject";
pub const REVISION: &str = "System.Rev";
pub const REVISED_DATE: &str = "System.RevisedDate";
pub const REASON: &str = "System.Reason";
pub const PARENT: &str = "System.Parent";
pub const ACTIVATED_DATE: &str = "Microsoft.VSTS.Common.ActivatedDate";
pub const ACTIVATED_BY: &str = "Microsoft.VSTS.Common.ActivatedBy";
pub const AUTHORIZED_DATE: &str = "System.AuthorizedDate";
pub const AUTHORIZED_AS: &str = "System.AuthorizedAs";
pub const BOARD_COLUMN: &str = "System.BoardColumn";
pub const BOARD_COLUMN_DONE: &str = "System.BoardColumnDone";
pub const BOARD_LANE: &str = "System.BoardLane";
pub const RESOLVED_DATE: &str = "Microsoft.VSTS.Common.ResolvedDate";
pub const RESOLVED_BY: &str = "Microsoft.VSTS.Common.ResolvedBy";
pub const RESOLVED_REASON: &str = "Microsoft.VSTS.Common.ResolvedReason";
pub const RELATED_LINK_COUNT: &str = "System.RelatedLinkCount";
pub const ATTACHED_FILE_COUNT: &str = "System.AttachedFileCount";
pub const EXTERNAL_LINK_COUNT: &str = "System.ExternalLinkCount";
pub const HYPERLINK_COUNT: &str = "System.HyperLinkCount";
pub const REMOTE_LINK_COUNT: &str = "System.RemoteLinkCount";
pub const COMMENT_COUNT: &str = "System.CommentCount";
pub const NODE_NAME: &str = "System.NodeName";
pub const WATERMARK: &str = "System.Watermark";

// Agile process fields
pub const REPRO_STEPS: &str = "Microsoft.VSTS.TCM.ReproSteps";
pub const SYSTEM_INFO: &str = "Microsoft.VSTS.TCM.SystemInfo";
pub const STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
pub const ACTIVITY: &str = "Microsoft.VSTS.Common.Activity";
pub const SEVERITY: &str = "Microsoft.VSTS.Common.Severity";
pub const ORIGINAL_ESTIMATE: &str = "Microsoft.VSTS.Scheduling.OriginalEstimate";
pub const REMAINING_WORK: &str = "Microsoft.VSTS.Scheduling.RemainingWork";
pub const COMPLETED_WORK: &str = "Microsoft.VSTS.Scheduling.CompletedWork";
pub const FOUND_IN: &str = "Microsoft.VSTS.Build.FoundIn";
pub const INTEGRATION_BUILD: &str = "Microsoft.VSTS.Build.IntegrationBuild";
pub const VALUE_AREA: &str = "Microsoft.VSTS.Common.ValueArea";
pub const RISK: &str = "Microsoft.VSTS.Common.Risk";
pub const BUSINESS_VALUE: &str = "Microsoft.VSTS.Common.BusinessValue";
pub const EFFORT: &str = "Microsoft.VSTS.Scheduling.Effort";
pub const START_DATE: &str = "Microsoft.VSTS.Scheduling.StartDate";
pub const TARGET_DATE: &str = "Microsoft.VSTS.Scheduling.TargetDate";
pub const FINISH_DATE: &str = "Microsoft.VSTS.Scheduling.FinishDate";
pub const TIME_CRITICALITY: &str = "Microsoft.VSTS.Common.TimeCriticality";
pub const ACCEPTANCE_CRITERIA: &str = "Microsoft.VSTS.Common.AcceptanceCriteria";

/// Common state names. The process template decides which ones exist.
pub mod states {
    pub const NEW: &str = "New";
    pub const ACTIVE: &str = "Active";
    pub const INACTIVE: &str = "Inactive";
    pub const RESOLVED: &str = "Resolved";
    pub const CLOSED: &str = "Closed";
    pub const REMOVED: &str = "Removed";
    pub const DESIGN: &str = "Design";
    pub const READY: &str = "Ready";
    pub const IN_PLANNING: &str = "In Planning";
    pub const IN_PROGRESS: &str = "In Progress";
    pub const COMPLETED: &str = "Completed";
}
